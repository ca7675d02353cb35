//! Record types — the fundamental unit of the Strata object store.
//!
//! A record is one immutable snapshot of an object's data plus temporal and
//! correction metadata. Records are never updated or deleted; the single
//! permitted system mutation is the end-dating of the open record when a new
//! record supersedes it (see [`crate::chain`]).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─── Record ──────────────────────────────────────────────────────────────────

/// One immutable snapshot of an object's data.
///
/// `start_at`/`end_at` form the *material* validity interval (exclusive upper
/// bound, `end_at = None` while the record is the open one).
/// `registration_at` is the *formal* axis: when the snapshot was recorded
/// administratively, independent of its material window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
  /// 1-based, monotonically increasing, unique per object, never reused.
  pub index:           u32,
  /// Schema version of the object type in effect for this snapshot.
  pub version:         u16,
  /// Arbitrary JSON payload conforming to the type's schema at `version`.
  pub data:            serde_json::Value,
  pub start_at:        NaiveDate,
  pub end_at:          Option<NaiveDate>,
  pub registration_at: NaiveDate,
  /// Index of the prior record of the same object this record corrects.
  pub correction_for:  Option<u32>,
  /// Derived inverse of `correction_for`: index of the record correcting
  /// this one, if any. At most one corrector per record.
  pub corrected_by:    Option<u32>,
  /// Optional GeoJSON value, orthogonal to the temporal model.
  pub geometry:        Option<serde_json::Value>,
  pub created_at:      DateTime<Utc>,
}

// ─── RecordDraft ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::ObjectStore::append_record`].
/// `index`, `end_at` and `registration_at` are always assigned by the store;
/// they are not accepted from callers.
#[derive(Debug, Clone)]
pub struct RecordDraft {
  pub version:        u16,
  pub data:           serde_json::Value,
  pub start_at:       NaiveDate,
  pub geometry:       Option<serde_json::Value>,
  /// Marks the new record as a retroactive correction of an existing index.
  pub correction_for: Option<u32>,
}

impl RecordDraft {
  /// Convenience constructor with no geometry and no correction link.
  pub fn new(version: u16, data: serde_json::Value, start_at: NaiveDate) -> Self {
    Self {
      version,
      data,
      start_at,
      geometry: None,
      correction_for: None,
    }
  }
}
