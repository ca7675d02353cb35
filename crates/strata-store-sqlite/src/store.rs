//! [`SqliteStore`] — the SQLite implementation of [`ObjectStore`].

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use strata_core::{
  chain,
  filter::contains_anywhere,
  object::{Object, ObjectType},
  permission::{Permission, TokenAuth},
  record::{Record, RecordDraft},
  store::{ObjectState, ObjectStore, RecordQuery, ResolvedObject},
  temporal::{TemporalAxis, visible_record},
};

use crate::{
  Error, Result,
  encode::{
    RawObject, RawObjectType, RawPermission, RawRecord, RawToken, decode_records,
    encode_date, encode_dt, encode_fields, encode_mode, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strata store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// go through the one connection, which serializes appends; the append
/// transaction additionally guarantees the end-dating and insert land
/// together or not at all.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers (run inside connection closures) ────────────────────────────

fn load_object(conn: &rusqlite::Connection, uuid: &str) -> Result<Option<RawObject>> {
  Ok(
    conn
      .query_row(
        "SELECT uuid, object_type, created_at, modified_at FROM objects WHERE uuid = ?1",
        rusqlite::params![uuid],
        |row| {
          Ok(RawObject {
            uuid:        row.get(0)?,
            object_type: row.get(1)?,
            created_at:  row.get(2)?,
            modified_at: row.get(3)?,
          })
        },
      )
      .optional()?,
  )
}

fn load_object_type(
  conn: &rusqlite::Connection,
  uuid: &str,
) -> Result<Option<RawObjectType>> {
  Ok(
    conn
      .query_row(
        "SELECT uuid, service_url, name, name_plural, allow_geometry, created_at, modified_at
         FROM object_types WHERE uuid = ?1",
        rusqlite::params![uuid],
        |row| {
          Ok(RawObjectType {
            uuid:           row.get(0)?,
            service_url:    row.get(1)?,
            name:           row.get(2)?,
            name_plural:    row.get(3)?,
            allow_geometry: row.get(4)?,
            created_at:     row.get(5)?,
            modified_at:    row.get(6)?,
          })
        },
      )
      .optional()?,
  )
}

/// All records of one object, decoded and ordered by index, with the
/// `corrected_by` inverses derived.
fn load_records(conn: &rusqlite::Connection, object: &str) -> Result<Vec<Record>> {
  let mut stmt = conn.prepare(
    "SELECT idx, version, data, start_at, end_at, registration_at,
            correct_idx, geometry, created_at
     FROM records WHERE object_uuid = ?1 ORDER BY idx",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![object], |row| {
      Ok(RawRecord {
        idx:             row.get(0)?,
        version:         row.get(1)?,
        data:            row.get(2)?,
        start_at:        row.get(3)?,
        end_at:          row.get(4)?,
        registration_at: row.get(5)?,
        correct_idx:     row.get(6)?,
        geometry:        row.get(7)?,
        created_at:      row.get(8)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  decode_records(raws)
}

fn insert_record(
  conn: &rusqlite::Connection,
  object: &str,
  record: &Record,
) -> Result<()> {
  conn.execute(
    "INSERT INTO records (
       object_uuid, idx, version, data, start_at, end_at, registration_at,
       correct_idx, geometry, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      object,
      record.index,
      record.version,
      record.data.to_string(),
      encode_date(record.start_at),
      record.end_at.map(encode_date),
      encode_date(record.registration_at),
      record.correction_for,
      record.geometry.as_ref().map(|g| g.to_string()),
      encode_dt(record.created_at),
    ],
  )?;
  Ok(())
}

/// Pre-filter for the contains-anywhere mode: every object with *any* record
/// holding a matching string leaf. The final check runs against the visible
/// record only; this pass exists so the scan uses the backend's structural
/// JSON walk. Backends built without `json_tree` surface the distinguished
/// capability error instead of silently returning nothing.
fn contains_candidates(
  conn: &rusqlite::Connection,
  needle: &str,
) -> Result<HashSet<String>> {
  let mut stmt = conn
    .prepare(
      "SELECT DISTINCT r.object_uuid
       FROM records r, json_tree(r.data) jt
       WHERE jt.type = 'text' AND instr(lower(jt.value), lower(?1)) > 0",
    )
    .map_err(map_capability_err)?;
  let uuids = stmt
    .query_map(rusqlite::params![needle], |row| row.get::<_, String>(0))
    .map_err(map_capability_err)?
    .collect::<rusqlite::Result<HashSet<_>>>()?;
  Ok(uuids)
}

fn map_capability_err(e: rusqlite::Error) -> Error {
  if e.to_string().contains("json_tree") {
    Error::Core(strata_core::Error::SearchNotSupported)
  } else {
    e.into()
  }
}

// ─── ObjectStore impl ────────────────────────────────────────────────────────

impl ObjectStore for SqliteStore {
  type Error = Error;

  // ── Object types ──────────────────────────────────────────────────────────

  async fn put_object_type(&self, object_type: ObjectType) -> Result<()> {
    let uuid_str = encode_uuid(object_type.uuid);
    let created  = encode_dt(object_type.created_at);
    let modified = encode_dt(object_type.modified_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO object_types
             (uuid, service_url, name, name_plural, allow_geometry, created_at, modified_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            uuid_str,
            object_type.service_url,
            object_type.name,
            object_type.name_plural,
            object_type.allow_geometry,
            created,
            modified,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_object_type(&self, uuid: Uuid) -> Result<Option<ObjectType>> {
    let uuid_str = encode_uuid(uuid);
    let raw = self
      .conn
      .call(move |conn| Ok(load_object_type(conn, &uuid_str)))
      .await??;
    raw.map(RawObjectType::into_object_type).transpose()
  }

  async fn list_object_types(&self) -> Result<Vec<ObjectType>> {
    let raws: Vec<RawObjectType> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT uuid, service_url, name, name_plural, allow_geometry, created_at, modified_at
           FROM object_types ORDER BY name",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawObjectType {
              uuid:           row.get(0)?,
              service_url:    row.get(1)?,
              name:           row.get(2)?,
              name_plural:    row.get(3)?,
              allow_geometry: row.get(4)?,
              created_at:     row.get(5)?,
              modified_at:    row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawObjectType::into_object_type).collect()
  }

  // ── Objects and records ───────────────────────────────────────────────────

  async fn create_object(
    &self,
    object_type: Uuid,
    draft: RecordDraft,
  ) -> Result<(Object, Record)> {
    let now = Utc::now();
    let object = Object {
      uuid: Uuid::new_v4(),
      object_type,
      created_at: now,
      modified_at: now,
    };

    let object_str = encode_uuid(object.uuid);
    let type_str   = encode_uuid(object_type);
    let record = Record {
      index:           1,
      version:         draft.version,
      data:            draft.data,
      start_at:        draft.start_at,
      end_at:          None,
      registration_at: now.date_naive(),
      correction_for:  None,
      corrected_by:    None,
      geometry:        draft.geometry,
      created_at:      now,
    };
    let created  = encode_dt(now);

    let record_for_insert = record.clone();
    let inner: Result<()> = self
      .conn
      .call(move |conn| {
        Ok((|| {
          let tx = conn.transaction()?;
          if load_object_type(&tx, &type_str)?.is_none() {
            return Err(Error::Core(strata_core::Error::ObjectTypeNotFound(
              type_str.clone(),
            )));
          }
          tx.execute(
            "INSERT INTO objects (uuid, object_type, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![object_str, type_str, created, created],
          )?;
          insert_record(&tx, &object_str, &record_for_insert)?;
          tx.commit()?;
          Ok(())
        })())
      })
      .await?;
    inner?;

    Ok((object, record))
  }

  async fn get_object(&self, uuid: Uuid) -> Result<Option<Object>> {
    let uuid_str = encode_uuid(uuid);
    let raw = self
      .conn
      .call(move |conn| Ok(load_object(conn, &uuid_str)))
      .await??;
    raw.map(RawObject::into_object).transpose()
  }

  async fn append_record(&self, object: Uuid, draft: RecordDraft) -> Result<Record> {
    let object_str = encode_uuid(object);
    let now = Utc::now();

    let record = self
      .conn
      .call(move |conn| {
        Ok((|| {
          let tx = conn.transaction()?;

          if load_object(&tx, &object_str)?.is_none() {
            return Err(Error::Core(strata_core::Error::ObjectNotFound(object)));
          }
          let existing = load_records(&tx, &object_str)?;
          let plan = chain::plan_append(object, &existing, &draft)?;

          // the single permitted in-place mutation: end-date the record the
          // new one supersedes, inside the same transaction as the insert
          if let Some(close) = plan.close_index {
            tx.execute(
              "UPDATE records SET end_at = ?1 WHERE object_uuid = ?2 AND idx = ?3",
              rusqlite::params![encode_date(draft.start_at), object_str, close],
            )?;
          }

          let record = Record {
            index:           plan.index,
            version:         draft.version,
            data:            draft.data,
            start_at:        draft.start_at,
            end_at:          None,
            registration_at: now.date_naive(),
            correction_for:  draft.correction_for,
            corrected_by:    None,
            geometry:        draft.geometry,
            created_at:      now,
          };
          insert_record(&tx, &object_str, &record)?;
          tx.execute(
            "UPDATE objects SET modified_at = ?1 WHERE uuid = ?2",
            rusqlite::params![encode_dt(now), object_str],
          )?;
          tx.commit()?;
          Ok(record)
        })())
      })
      .await??;

    Ok(record)
  }

  async fn clear_correction(&self, object: Uuid, index: u32) -> Result<Record> {
    let object_str = encode_uuid(object);

    let record = self
      .conn
      .call(move |conn| {
        Ok((|| {
          let tx = conn.transaction()?;
          let records = load_records(&tx, &object_str)?;
          if !records.iter().any(|r| r.index == index) {
            return Err(Error::Core(strata_core::Error::IndexNotFound {
              object,
              index,
            }));
          }
          tx.execute(
            "UPDATE records SET correct_idx = NULL WHERE object_uuid = ?1 AND idx = ?2",
            rusqlite::params![object_str, index],
          )?;
          tx.commit()?;

          let records = load_records(conn, &object_str)?;
          records
            .into_iter()
            .find(|r| r.index == index)
            .ok_or(Error::Core(strata_core::Error::IndexNotFound { object, index }))
        })())
      })
      .await??;

    Ok(record)
  }

  async fn list_records(&self, object: Uuid) -> Result<Vec<Record>> {
    let object_str = encode_uuid(object);
    self
      .conn
      .call(move |conn| Ok(load_records(conn, &object_str)))
      .await?
  }

  async fn get_record(&self, object: Uuid, index: u32) -> Result<Option<Record>> {
    let records = self.list_records(object).await?;
    Ok(records.into_iter().find(|r| r.index == index))
  }

  async fn delete_object(&self, uuid: Uuid) -> Result<bool> {
    let uuid_str = encode_uuid(uuid);
    let deleted = self
      .conn
      .call(move |conn| {
        // records go with the object (ON DELETE CASCADE)
        let n = conn.execute(
          "DELETE FROM objects WHERE uuid = ?1",
          rusqlite::params![uuid_str],
        )?;
        Ok(n > 0)
      })
      .await?;
    Ok(deleted)
  }

  // ── Resolution ────────────────────────────────────────────────────────────

  async fn get_object_state(&self, uuid: Uuid, axis: TemporalAxis) -> Result<ObjectState> {
    let uuid_str = encode_uuid(uuid);

    let state = self
      .conn
      .call(move |conn| {
        Ok((|| -> Result<ObjectState> {
          let Some(raw_object) = load_object(conn, &uuid_str)? else {
            return Ok(ObjectState::Missing);
          };
          let raw_type = load_object_type(conn, &raw_object.object_type)?.ok_or(
            Error::Core(strata_core::Error::ObjectTypeNotFound(
              raw_object.object_type.clone(),
            )),
          )?;

          let object = raw_object.into_object()?;
          let object_type = raw_type.into_object_type()?;
          let records = load_records(conn, &uuid_str)?;

          match visible_record(&records, axis) {
            Some(record) => Ok(ObjectState::Visible(ResolvedObject {
              object,
              object_type,
              record: record.clone(),
            })),
            None => Ok(ObjectState::NoVisibleRecord { object, object_type }),
          }
        })())
      })
      .await??;

    Ok(state)
  }

  async fn list_objects(&self, query: &RecordQuery) -> Result<Vec<ResolvedObject>> {
    let type_filter: Option<Vec<String>> = query
      .object_types
      .as_ref()
      .map(|types| types.iter().copied().map(encode_uuid).collect());
    if type_filter.as_ref().is_some_and(Vec::is_empty) {
      return Ok(Vec::new());
    }

    let axis    = query.axis;
    let version = query.type_version;
    let filters = query.filters.clone();
    let text    = query.text.clone();

    let resolved = self
      .conn
      .call(move |conn| {
        Ok((|| -> Result<Vec<ResolvedObject>> {
          // structural pre-filter for the free-text mode
          let candidates = text
            .as_deref()
            .map(|needle| contains_candidates(conn, needle))
            .transpose()?;

          let mut sql = String::from(
            "SELECT uuid, object_type, created_at, modified_at FROM objects",
          );
          if let Some(types) = &type_filter {
            let placeholders = vec!["?"; types.len()].join(", ");
            sql.push_str(&format!(" WHERE object_type IN ({placeholders})"));
          }
          sql.push_str(" ORDER BY created_at DESC");

          let mut stmt = conn.prepare(&sql)?;
          let raw_objects = stmt
            .query_map(
              rusqlite::params_from_iter(type_filter.iter().flatten()),
              |row| {
                Ok(RawObject {
                  uuid:        row.get(0)?,
                  object_type: row.get(1)?,
                  created_at:  row.get(2)?,
                  modified_at: row.get(3)?,
                })
              },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

          let mut types: HashMap<String, ObjectType> = HashMap::new();
          let mut out = Vec::new();

          for raw in raw_objects {
            if candidates.as_ref().is_some_and(|c| !c.contains(&raw.uuid)) {
              continue;
            }

            let type_key = raw.object_type.clone();
            if !types.contains_key(&type_key) {
              let raw_type = load_object_type(conn, &type_key)?.ok_or(Error::Core(
                strata_core::Error::ObjectTypeNotFound(type_key.clone()),
              ))?;
              types.insert(type_key.clone(), raw_type.into_object_type()?);
            }

            let records = load_records(conn, &raw.uuid)?;
            // objects with nothing visible on the axis are silently excluded
            let Some(record) = visible_record(&records, axis) else {
              continue;
            };
            if version.is_some_and(|v| record.version != v) {
              continue;
            }
            // filters never reach beyond the visible record
            if !filters.iter().all(|f| f.matches(&record.data)) {
              continue;
            }
            if text.as_deref().is_some_and(|n| !contains_anywhere(&record.data, n)) {
              continue;
            }

            out.push(ResolvedObject {
              object:      raw.into_object()?,
              object_type: types[&type_key].clone(),
              record:      record.clone(),
            });
          }

          Ok(out)
        })())
      })
      .await??;

    Ok(resolved)
  }

  // ── Tokens and permissions ────────────────────────────────────────────────

  async fn put_token(&self, token: TokenAuth) -> Result<()> {
    let created = encode_dt(token.created_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO tokens
             (token, contact_person, email, organization, application,
              administration, is_superuser, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            token.token,
            token.contact_person,
            token.email,
            token.organization,
            token.application,
            token.administration,
            token.is_superuser,
            created,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_token(&self, key: &str) -> Result<Option<TokenAuth>> {
    let key = key.to_owned();
    let raw: Option<RawToken> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT token, contact_person, email, organization, application,
                      administration, is_superuser, created_at
               FROM tokens WHERE token = ?1",
              rusqlite::params![key],
              |row| {
                Ok(RawToken {
                  token:          row.get(0)?,
                  contact_person: row.get(1)?,
                  email:          row.get(2)?,
                  organization:   row.get(3)?,
                  application:    row.get(4)?,
                  administration: row.get(5)?,
                  is_superuser:   row.get(6)?,
                  created_at:     row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawToken::into_token).transpose()
  }

  async fn set_permission(&self, token: &str, permission: Permission) -> Result<()> {
    let token    = token.to_owned();
    let type_str = encode_uuid(permission.object_type);
    let mode     = encode_mode(permission.mode).to_owned();
    let fields   = encode_fields(&permission.fields)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO permissions (token, object_type, mode, use_fields, fields)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![token, type_str, mode, permission.use_fields, fields],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_permission(
    &self,
    token: &str,
    object_type: Uuid,
  ) -> Result<Option<Permission>> {
    let token    = token.to_owned();
    let type_str = encode_uuid(object_type);

    let raw: Option<RawPermission> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT object_type, mode, use_fields, fields
               FROM permissions WHERE token = ?1 AND object_type = ?2",
              rusqlite::params![token, type_str],
              |row| {
                Ok(RawPermission {
                  object_type: row.get(0)?,
                  mode:        row.get(1)?,
                  use_fields:  row.get(2)?,
                  fields:      row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPermission::into_permission).transpose()
  }

  async fn list_permissions(&self, token: &str) -> Result<Vec<Permission>> {
    let token = token.to_owned();

    let raws: Vec<RawPermission> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT object_type, mode, use_fields, fields
           FROM permissions WHERE token = ?1 ORDER BY object_type",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![token], |row| {
            Ok(RawPermission {
              object_type: row.get(0)?,
              mode:        row.get(1)?,
              use_fields:  row.get(2)?,
              fields:      row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPermission::into_permission).collect()
  }
}
