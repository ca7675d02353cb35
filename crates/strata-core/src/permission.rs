//! Token identities and per-type permissions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::AllowedFields;

// ─── Mode ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
  ReadOnly,
  ReadAndWrite,
}

impl PermissionMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ReadOnly => "read_only",
      Self::ReadAndWrite => "read_and_write",
    }
  }
}

// ─── Token identity ──────────────────────────────────────────────────────────

/// A caller identity, keyed by its API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAuth {
  pub token:          String,
  pub contact_person: String,
  pub email:          String,
  pub organization:   String,
  pub application:    String,
  pub administration: String,
  /// Superusers bypass type permissions and field authorization entirely.
  pub is_superuser:   bool,
  pub created_at:     DateTime<Utc>,
}

// ─── Permission ──────────────────────────────────────────────────────────────

/// What one token may do with objects of one type. Field allow-lists are
/// keyed by schema version; a version without an entry allows nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
  pub object_type: Uuid,
  pub mode:        PermissionMode,
  /// Whether field-based authorization applies to reads under this
  /// permission.
  pub use_fields:  bool,
  pub fields:      BTreeMap<u16, Vec<String>>,
}

impl Permission {
  /// The field set this permission authorizes for records at `version`.
  pub fn allowed_fields(&self, version: u16) -> AllowedFields {
    if self.mode == PermissionMode::ReadOnly && self.use_fields {
      AllowedFields::Restricted(self.fields.get(&version).cloned().unwrap_or_default())
    } else {
      AllowedFields::All
    }
  }

  pub fn can_write(&self) -> bool {
    self.mode == PermissionMode::ReadAndWrite
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn permission(mode: PermissionMode, use_fields: bool) -> Permission {
    Permission {
      object_type: Uuid::new_v4(),
      mode,
      use_fields,
      fields: BTreeMap::from([(1, vec!["url".to_string(), "uuid".to_string()])]),
    }
  }

  #[test]
  fn read_and_write_ignores_field_lists() {
    let p = permission(PermissionMode::ReadAndWrite, true);
    assert_eq!(p.allowed_fields(1), AllowedFields::All);
  }

  #[test]
  fn field_based_read_only_restricts_per_version() {
    let p = permission(PermissionMode::ReadOnly, true);
    assert_eq!(
      p.allowed_fields(1),
      AllowedFields::Restricted(vec!["url".to_string(), "uuid".to_string()])
    );
    // a version without an entry allows nothing
    assert_eq!(p.allowed_fields(2), AllowedFields::Restricted(vec![]));
  }

  #[test]
  fn plain_read_only_passes_everything() {
    let p = permission(PermissionMode::ReadOnly, false);
    assert_eq!(p.allowed_fields(1), AllowedFields::All);
  }
}
