//! Handlers for the `/objects` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/objects` | temporal + attribute filters, `fields`, `ordering` |
//! | `POST`   | `/objects` | 201 + stored representation |
//! | `GET`    | `/objects/:uuid` | single object, resolved on the requested axis |
//! | `PUT`    | `/objects/:uuid` | appends a full replacement record |
//! | `PATCH`  | `/objects/:uuid` | appends a record with merged payload |
//! | `DELETE` | `/objects/:uuid` | removes the object and its history |
//! | `GET`    | `/objects/:uuid/history` | all records, unfiltered |
//! | `GET`    | `/objects/:uuid/history/:index` | one record |
//!
//! Readers only ever see the record their temporal axis resolves to, shaped
//! by their permission's field allow-list; paths suppressed that way are
//! reported in the `X-Unauthorized-Fields` response header.

use std::collections::HashMap;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
  response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use strata_core::{
  external::Action,
  object::{Object, ObjectType},
  ordering,
  permission::{Permission, PermissionMode},
  projection::{self, AllowedFields, SuppressedFields},
  record::{Record, RecordDraft},
  store::{ObjectState, ObjectStore, RecordQuery, ResolvedObject},
};
use uuid::Uuid;

use crate::{AppState, auth::Identity, error::ApiError, params, patch};

// ─── Access ──────────────────────────────────────────────────────────────────

/// The caller's effective access to one object type.
pub(crate) enum Access {
  /// Superuser: everything, unshaped.
  Full,
  Granted(Permission),
}

impl Access {
  fn allowed_fields(&self, version: u16) -> AllowedFields {
    match self {
      Self::Full => AllowedFields::All,
      Self::Granted(p) => p.allowed_fields(version),
    }
  }

  fn field_restricted(&self) -> bool {
    matches!(
      self,
      Self::Granted(p) if p.mode == PermissionMode::ReadOnly && p.use_fields
    )
  }

  fn can_write(&self) -> bool {
    match self {
      Self::Full => true,
      Self::Granted(p) => p.can_write(),
    }
  }
}

async fn access_for<S>(
  state: &AppState<S>,
  caller: &Identity,
  object_type: Uuid,
) -> Result<Option<Access>, ApiError>
where
  S: ObjectStore,
{
  if caller.is_superuser() {
    return Ok(Some(Access::Full));
  }
  Ok(
    state
      .store
      .get_permission(caller.key(), object_type)
      .await
      .map_err(ApiError::from_store)?
      .map(Access::Granted),
  )
}

/// No permission for the type reads as "no such object" so callers cannot
/// probe for uuids outside their types.
async fn read_access<S>(
  state: &AppState<S>,
  caller: &Identity,
  object_type: Uuid,
  object: Uuid,
) -> Result<Access, ApiError>
where
  S: ObjectStore,
{
  access_for(state, caller, object_type)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("object {object} not found")))
}

async fn write_access<S>(
  state: &AppState<S>,
  caller: &Identity,
  object_type: Uuid,
) -> Result<(), ApiError>
where
  S: ObjectStore,
{
  match access_for(state, caller, object_type).await? {
    Some(access) if access.can_write() => Ok(()),
    _ => Err(ApiError::Forbidden(
      "token lacks write access for this object type".to_string(),
    )),
  }
}

// ─── Representation ──────────────────────────────────────────────────────────

fn representation<S>(
  state: &AppState<S>,
  object: &Object,
  object_type: &ObjectType,
  record: &Record,
) -> Result<Value, ApiError> {
  let record = serde_json::to_value(record)
    .map_err(|e| ApiError::Internal(format!("serializing record: {e}")))?;
  Ok(json!({
    "url": format!("{}/objects/{}", state.base_url.trim_end_matches('/'), object.uuid),
    "uuid": object.uuid,
    "type": object_type.url(),
    "record": record,
  }))
}

/// The suppressed-field report key: the type URL plus the schema version the
/// projected record was written under.
fn source_label(object_type: &ObjectType, version: u16) -> String {
  format!("{}({version})", object_type.url())
}

fn suppressed_header(report: &SuppressedFields) -> HeaderMap {
  let mut headers = HeaderMap::new();
  if !report.is_empty() {
    if let Ok(value) = HeaderValue::from_str(&report.pretty()) {
      headers.insert(HeaderName::from_static("x-unauthorized-fields"), value);
    }
  }
  headers
}

// ─── Write bodies ────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /objects` and `PUT /objects/:uuid`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectWrite {
  /// Object type reference: registry URL or bare uuid.
  pub r#type: String,
  pub record: RecordWrite,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWrite {
  pub type_version:   u16,
  pub data:           Value,
  pub start_at:       NaiveDate,
  #[serde(default)]
  pub geometry:       Option<Value>,
  #[serde(default)]
  pub correction_for: Option<u32>,
}

impl RecordWrite {
  fn into_draft(self) -> RecordDraft {
    RecordDraft {
      version:        self.type_version,
      data:           self.data,
      start_at:       self.start_at,
      geometry:       self.geometry,
      correction_for: self.correction_for,
    }
  }
}

/// JSON body accepted by `PATCH /objects/:uuid`; every part is optional and
/// omitted parts carry over from the latest record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPatch {
  #[serde(default)]
  pub r#type: Option<String>,
  #[serde(default)]
  pub record: Option<RecordPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
  #[serde(default)]
  pub type_version:   Option<u16>,
  #[serde(default)]
  pub data:           Option<Value>,
  #[serde(default)]
  pub start_at:       Option<NaiveDate>,
  #[serde(default)]
  pub geometry:       Option<Value>,
  #[serde(default)]
  pub correction_for: Option<u32>,
}

// ─── Write checks ────────────────────────────────────────────────────────────

fn check_geometry(object_type: &ObjectType, draft: &RecordDraft) -> Result<(), ApiError> {
  if draft.geometry.is_some() && !object_type.allow_geometry {
    return Err(strata_core::Error::GeometryNotAllowed(object_type.uuid).into());
  }
  Ok(())
}

fn validate_payload<S>(
  state: &AppState<S>,
  object_type: &ObjectType,
  draft: &RecordDraft,
) -> Result<(), ApiError> {
  if let Err(violations) = state
    .validator
    .validate(object_type, draft.version, &draft.data)
  {
    let detail = violations
      .iter()
      .map(|v| format!("{}: {}", v.path, v.message))
      .collect::<Vec<_>>()
      .join("; ");
    return Err(ApiError::BadRequest(format!(
      "payload does not satisfy the type schema: {detail}"
    )));
  }
  Ok(())
}

async fn cached_type<S>(state: &AppState<S>, uuid: Uuid) -> Result<ObjectType, ApiError>
where
  S: ObjectStore,
{
  state
    .store
    .get_object_type(uuid)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::Internal(format!("object type {uuid} missing from cache")))
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /objects`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ObjectStore + 'static,
{
  let params::ListQuery {
    axis,
    object_type,
    type_version,
    filters,
    text,
    fields,
    ordering: order_keys,
  } = params::parse_pairs(&pairs)?;

  // the caller's permissions define the visible universe of types
  let permissions: HashMap<Uuid, Permission> = if caller.is_superuser() {
    HashMap::new()
  } else {
    state
      .store
      .list_permissions(caller.key())
      .await
      .map_err(ApiError::from_store)?
      .into_iter()
      .map(|p| (p.object_type, p))
      .collect()
  };

  let object_types = if caller.is_superuser() {
    object_type.map(|t| vec![t])
  } else {
    Some(match object_type {
      Some(t) if permissions.contains_key(&t) => vec![t],
      Some(_) => vec![],
      None => permissions.keys().copied().collect(),
    })
  };

  // ordering terms are validated before the store is touched
  if !order_keys.is_empty() && !caller.is_superuser() {
    let allow_lists: Vec<Vec<String>> = permissions
      .values()
      .filter(|p| p.mode == PermissionMode::ReadOnly && p.use_fields)
      .flat_map(|p| p.fields.values().cloned())
      .collect();
    ordering::validate_terms(&order_keys, &allow_lists)?;
  }

  let mut record_query = RecordQuery::new(axis);
  record_query.object_types = object_types;
  record_query.type_version = type_version;
  record_query.filters = filters;
  record_query.text = text;

  let resolved = state
    .store
    .list_objects(&record_query)
    .await
    .map_err(ApiError::from_store)?;

  let mut report = SuppressedFields::default();
  let mut items = Vec::with_capacity(resolved.len());
  for ResolvedObject { object, object_type, record } in resolved {
    let allowed = if caller.is_superuser() {
      AllowedFields::All
    } else {
      match permissions.get(&object_type.uuid) {
        Some(p) => p.allowed_fields(record.version),
        None => continue,
      }
    };
    let full = representation(&state, &object, &object_type, &record)?;
    let source = source_label(&object_type, record.version);
    items.push(projection::apply(&full, &allowed, &fields, &source, &mut report)?);
  }

  if !order_keys.is_empty() {
    ordering::sort_by_keys(&mut items, &order_keys);
  }

  Ok((suppressed_header(&report), Json(items)))
}

// ─── Retrieve ────────────────────────────────────────────────────────────────

/// `GET /objects/:uuid`
pub async fn retrieve<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Path(uuid): Path<Uuid>,
  Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ObjectStore + 'static,
{
  let query = params::parse_pairs(&pairs)?;

  let resolved = match state
    .store
    .get_object_state(uuid, query.axis)
    .await
    .map_err(ApiError::from_store)?
  {
    ObjectState::Missing => {
      return Err(ApiError::NotFound(format!("object {uuid} not found")));
    }
    ObjectState::NoVisibleRecord { object_type, .. } => {
      // access decides first, so a 404-at-date never leaks across types
      read_access(&state, &caller, object_type.uuid, uuid).await?;
      return Err(ApiError::NotFound(format!(
        "object {uuid} has no record visible on the requested date"
      )));
    }
    ObjectState::Visible(resolved) => resolved,
  };

  let access = read_access(&state, &caller, resolved.object_type.uuid, uuid).await?;
  let allowed = access.allowed_fields(resolved.record.version);

  let full =
    representation(&state, &resolved.object, &resolved.object_type, &resolved.record)?;
  let mut report = SuppressedFields::default();
  let source = source_label(&resolved.object_type, resolved.record.version);
  let item = projection::apply(&full, &allowed, &query.fields, &source, &mut report)?;

  Ok((suppressed_header(&report), Json(item)))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /objects` — 201 + the stored representation.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Json(body): Json<ObjectWrite>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ObjectStore + 'static,
{
  let type_uuid = params::type_ref_uuid(&body.r#type)?;
  write_access(&state, &caller, type_uuid).await?;

  let object_type = state
    .store
    .get_object_type(type_uuid)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::BadRequest(format!("unknown object type: {}", body.r#type)))?;

  let draft = body.record.into_draft();
  check_geometry(&object_type, &draft)?;
  validate_payload(&state, &object_type, &draft)?;

  let (object, record) = state
    .store
    .create_object(type_uuid, draft)
    .await
    .map_err(ApiError::from_store)?;
  state.notifier.notify(Action::Create, object.uuid, type_uuid);

  let full = representation(&state, &object, &object_type, &record)?;
  Ok((StatusCode::CREATED, Json(full)))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PUT /objects/:uuid` — appends a full replacement record.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Path(uuid): Path<Uuid>,
  Json(body): Json<ObjectWrite>,
) -> Result<Json<Value>, ApiError>
where
  S: ObjectStore + 'static,
{
  let object = state
    .store
    .get_object(uuid)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("object {uuid} not found")))?;
  write_access(&state, &caller, object.object_type).await?;

  let type_uuid = params::type_ref_uuid(&body.r#type)?;
  if type_uuid != object.object_type {
    return Err(strata_core::Error::TypeImmutable.into());
  }
  let object_type = cached_type(&state, object.object_type).await?;

  let draft = body.record.into_draft();
  check_geometry(&object_type, &draft)?;
  validate_payload(&state, &object_type, &draft)?;

  let record = state
    .store
    .append_record(uuid, draft)
    .await
    .map_err(ApiError::from_store)?;
  state.notifier.notify(Action::Update, uuid, object.object_type);

  Ok(Json(representation(&state, &object, &object_type, &record)?))
}

// ─── Partial update ──────────────────────────────────────────────────────────

/// `PATCH /objects/:uuid` — merges the body into the latest record's payload
/// and appends the result as a new record.
pub async fn partial_update<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Path(uuid): Path<Uuid>,
  Json(body): Json<ObjectPatch>,
) -> Result<Json<Value>, ApiError>
where
  S: ObjectStore + 'static,
{
  let object = state
    .store
    .get_object(uuid)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("object {uuid} not found")))?;
  write_access(&state, &caller, object.object_type).await?;

  if let Some(type_ref) = &body.r#type {
    if params::type_ref_uuid(type_ref)? != object.object_type {
      return Err(strata_core::Error::TypeImmutable.into());
    }
  }
  let object_type = cached_type(&state, object.object_type).await?;

  let base = state
    .store
    .list_records(uuid)
    .await
    .map_err(ApiError::from_store)?
    .pop()
    .ok_or_else(|| ApiError::Internal(format!("object {uuid} has no records")))?;

  let record_patch = body.record.unwrap_or_default();
  let data = match &record_patch.data {
    Some(p) => patch::merge_patch(&base.data, p),
    None => base.data.clone(),
  };
  let draft = RecordDraft {
    version:        record_patch.type_version.unwrap_or(base.version),
    data,
    start_at:       record_patch.start_at.unwrap_or(base.start_at),
    geometry:       record_patch.geometry.or_else(|| base.geometry.clone()),
    correction_for: record_patch.correction_for,
  };

  check_geometry(&object_type, &draft)?;
  validate_payload(&state, &object_type, &draft)?;

  let record = state
    .store
    .append_record(uuid, draft)
    .await
    .map_err(ApiError::from_store)?;
  state.notifier.notify(Action::PartialUpdate, uuid, object.object_type);

  Ok(Json(representation(&state, &object, &object_type, &record)?))
}

// ─── Destroy ─────────────────────────────────────────────────────────────────

/// `DELETE /objects/:uuid` — the object and its whole history.
pub async fn destroy<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Path(uuid): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: ObjectStore + 'static,
{
  let object = state
    .store
    .get_object(uuid)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("object {uuid} not found")))?;
  write_access(&state, &caller, object.object_type).await?;

  state
    .store
    .delete_object(uuid)
    .await
    .map_err(ApiError::from_store)?;
  state.notifier.notify(Action::Destroy, uuid, object.object_type);

  Ok(StatusCode::NO_CONTENT)
}

// ─── History ─────────────────────────────────────────────────────────────────

async fn history_access<S>(
  state: &AppState<S>,
  caller: &Identity,
  uuid: Uuid,
) -> Result<Object, ApiError>
where
  S: ObjectStore,
{
  let object = state
    .store
    .get_object(uuid)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("object {uuid} not found")))?;

  let access = read_access(state, caller, object.object_type, uuid).await?;
  // the raw history cannot be shaped per record, so field-restricted tokens
  // get none of it
  if access.field_restricted() {
    return Err(ApiError::Forbidden(
      "history is not available to field-restricted tokens".to_string(),
    ));
  }
  Ok(object)
}

/// `GET /objects/:uuid/history` — every record, newest last.
pub async fn history<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Path(uuid): Path<Uuid>,
) -> Result<Json<Vec<Record>>, ApiError>
where
  S: ObjectStore + 'static,
{
  history_access(&state, &caller, uuid).await?;
  let records = state
    .store
    .list_records(uuid)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(records))
}

/// `GET /objects/:uuid/history/:index`
pub async fn history_record<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
  Path((uuid, index)): Path<(Uuid, u32)>,
) -> Result<Json<Record>, ApiError>
where
  S: ObjectStore + 'static,
{
  history_access(&state, &caller, uuid).await?;
  let record = state
    .store
    .get_record(uuid, index)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("record with index {index} not found on object {uuid}"))
    })?;
  Ok(Json(record))
}
