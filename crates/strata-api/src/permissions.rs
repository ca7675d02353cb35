//! `GET /permissions` — the caller's own permissions, one entry per object
//! type.

use std::collections::BTreeMap;

use axum::{Json, extract::State};
use serde::Serialize;
use strata_core::{permission::PermissionMode, store::ObjectStore};
use uuid::Uuid;

use crate::{AppState, auth::Identity, error::ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionView {
  pub object_type: Uuid,
  pub mode:        PermissionMode,
  pub use_fields:  bool,
  pub fields:      BTreeMap<u16, Vec<String>>,
}

/// `GET /permissions`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: Identity,
) -> Result<Json<Vec<PermissionView>>, ApiError>
where
  S: ObjectStore + 'static,
{
  let permissions = state
    .store
    .list_permissions(caller.key())
    .await
    .map_err(ApiError::from_store)?;

  Ok(Json(
    permissions
      .into_iter()
      .map(|p| PermissionView {
        object_type: p.object_type,
        mode:        p.mode,
        use_fields:  p.use_fields,
        fields:      p.fields,
      })
      .collect(),
  ))
}
