//! The correction-chain planner — the append state machine per object.
//!
//! All decisions are made here over the object's full record sequence; the
//! store executes the resulting [`AppendPlan`] atomically (end-dating and
//! insert both succeed or both fail). Keeping the planner pure makes the
//! invariants testable without a database.

use uuid::Uuid;

use crate::{Error, Result, record::{Record, RecordDraft}};

// ─── Plan ────────────────────────────────────────────────────────────────────

/// The two writes an append consists of. Produced by [`plan_append`],
/// executed by the store in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendPlan {
  /// Index assigned to the new record: `max(existing) + 1`, starting at 1.
  pub index:       u32,
  /// Index of the currently-open record to end-date with the new record's
  /// `start_at`, if any. This is the only in-place mutation ever permitted.
  pub close_index: Option<u32>,
}

/// The record of an object currently lacking an `end_at`, if any.
/// Normal appends guarantee at most one.
pub fn open_record(records: &[Record]) -> Option<&Record> {
  records.iter().find(|r| r.end_at.is_none())
}

/// Validate `draft` against the object's existing records and decide the new
/// index and which record (if any) to end-date.
///
/// A correction append links `correction_for` but never end-dates the
/// corrected record's own window; supersession of any *other* open record
/// still applies as in the normal case.
pub fn plan_append(
  object: Uuid,
  records: &[Record],
  draft: &RecordDraft,
) -> Result<AppendPlan> {
  let index = records.iter().map(|r| r.index).max().unwrap_or(0) + 1;

  if let Some(target) = draft.correction_for {
    if target == index {
      return Err(Error::SelfCorrection);
    }
    let corrected = records
      .iter()
      .find(|r| r.index == target)
      .ok_or(Error::IndexNotFound { object, index: target })?;
    if let Some(by) = corrected.corrected_by {
      return Err(Error::AlreadyCorrected { index: target, by });
    }
  }

  let close_index = open_record(records)
    .filter(|open| draft.correction_for != Some(open.index))
    .map(|open| open.index);

  Ok(AppendPlan { index, close_index })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
