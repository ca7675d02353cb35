//! Object types and objects — the thin envelopes that own record history.
//!
//! An object holds only identity metadata. All payload data lives in its
//! records; the "current state" is assembled on read by resolving the record
//! visible on the requested temporal axis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A schema family registered in an external type registry and cached here.
/// Immutable once a record references it; schema evolution happens through
/// external versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectType {
  pub uuid:           Uuid,
  /// Base URL of the registry service this type originates from.
  pub service_url:    String,
  pub name:           String,
  pub name_plural:    String,
  /// Whether objects of this type may carry a geometry value.
  pub allow_geometry: bool,
  pub created_at:     DateTime<Utc>,
  pub modified_at:    DateTime<Utc>,
}

impl ObjectType {
  /// Canonical URL of this type in its registry service.
  pub fn url(&self) -> String {
    format!(
      "{}/objecttypes/{}",
      self.service_url.trim_end_matches('/'),
      self.uuid
    )
  }
}

/// A persistent identity owning an append-only sequence of records.
/// Deleting an object deletes its whole history (privacy requirement);
/// objects are never soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
  pub uuid:        Uuid,
  pub object_type: Uuid,
  pub created_at:  DateTime<Utc>,
  pub modified_at: DateTime<Utc>,
}
