//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings; the temporal axes as ISO dates.
//! Structured fields (payload data, geometry, permission field allow-lists)
//! are stored as compact JSON. UUIDs are stored as hyphenated lowercase
//! strings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use strata_core::{
  object::{Object, ObjectType},
  permission::{Permission, PermissionMode, TokenAuth},
  record::Record,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
  id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Ok(Uuid::parse_str(s)?)
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String {
  d.format("%Y-%m-%d").to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_mode(mode: PermissionMode) -> &'static str {
  mode.as_str()
}

pub fn decode_mode(s: &str) -> Result<PermissionMode> {
  match s {
    "read_only" => Ok(PermissionMode::ReadOnly),
    "read_and_write" => Ok(PermissionMode::ReadAndWrite),
    other => Err(Error::DateParse(format!("unknown permission mode: {other:?}"))),
  }
}

pub fn encode_fields(fields: &BTreeMap<u16, Vec<String>>) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<BTreeMap<u16, Vec<String>>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `object_types` row.
pub struct RawObjectType {
  pub uuid:           String,
  pub service_url:    String,
  pub name:           String,
  pub name_plural:    String,
  pub allow_geometry: bool,
  pub created_at:     String,
  pub modified_at:    String,
}

impl RawObjectType {
  pub fn into_object_type(self) -> Result<ObjectType> {
    Ok(ObjectType {
      uuid:           decode_uuid(&self.uuid)?,
      service_url:    self.service_url,
      name:           self.name,
      name_plural:    self.name_plural,
      allow_geometry: self.allow_geometry,
      created_at:     decode_dt(&self.created_at)?,
      modified_at:    decode_dt(&self.modified_at)?,
    })
  }
}

/// Raw strings read directly from an `objects` row.
pub struct RawObject {
  pub uuid:        String,
  pub object_type: String,
  pub created_at:  String,
  pub modified_at: String,
}

impl RawObject {
  pub fn into_object(self) -> Result<Object> {
    Ok(Object {
      uuid:        decode_uuid(&self.uuid)?,
      object_type: decode_uuid(&self.object_type)?,
      created_at:  decode_dt(&self.created_at)?,
      modified_at: decode_dt(&self.modified_at)?,
    })
  }
}

/// Raw strings read directly from a `records` row.
pub struct RawRecord {
  pub idx:             u32,
  pub version:         u16,
  pub data:            String,
  pub start_at:        String,
  pub end_at:          Option<String>,
  pub registration_at: String,
  pub correct_idx:     Option<u32>,
  pub geometry:        Option<String>,
  pub created_at:      String,
}

impl RawRecord {
  /// Decode without the derived `corrected_by` back-reference; that is
  /// filled in once all records of the object are loaded.
  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      index:           self.idx,
      version:         self.version,
      data:            serde_json::from_str(&self.data)?,
      start_at:        decode_date(&self.start_at)?,
      end_at:          self.end_at.as_deref().map(decode_date).transpose()?,
      registration_at: decode_date(&self.registration_at)?,
      correction_for:  self.correct_idx,
      corrected_by:    None,
      geometry:        self
        .geometry
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Decode a full record sequence and derive the `corrected_by` inverses.
pub fn decode_records(raws: Vec<RawRecord>) -> Result<Vec<Record>> {
  let mut records: Vec<Record> =
    raws.into_iter().map(RawRecord::into_record).collect::<Result<_>>()?;

  let links: Vec<(u32, u32)> = records
    .iter()
    .filter_map(|r| r.correction_for.map(|target| (target, r.index)))
    .collect();
  for (target, corrector) in links {
    if let Some(corrected) = records.iter_mut().find(|r| r.index == target) {
      corrected.corrected_by = Some(corrector);
    }
  }

  Ok(records)
}

/// Raw strings read directly from a `tokens` row.
pub struct RawToken {
  pub token:          String,
  pub contact_person: String,
  pub email:          String,
  pub organization:   String,
  pub application:    String,
  pub administration: String,
  pub is_superuser:   bool,
  pub created_at:     String,
}

impl RawToken {
  pub fn into_token(self) -> Result<TokenAuth> {
    Ok(TokenAuth {
      token:          self.token,
      contact_person: self.contact_person,
      email:          self.email,
      organization:   self.organization,
      application:    self.application,
      administration: self.administration,
      is_superuser:   self.is_superuser,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `permissions` row.
pub struct RawPermission {
  pub object_type: String,
  pub mode:        String,
  pub use_fields:  bool,
  pub fields:      String,
}

impl RawPermission {
  pub fn into_permission(self) -> Result<Permission> {
    Ok(Permission {
      object_type: decode_uuid(&self.object_type)?,
      mode:        decode_mode(&self.mode)?,
      use_fields:  self.use_fields,
      fields:      decode_fields(&self.fields)?,
    })
  }
}
