//! The temporal resolver — which record of an object is "the" current one.
//!
//! Two axes exist and are mutually exclusive in one request:
//!
//! - the *material* axis answers "what was true in the real world on date d"
//!   by interval containment over `[start_at, end_at)`;
//! - the *formal* axis answers "what did we believe was true as of
//!   registration time T" by picking the most recently registered record
//!   with `registration_at <= T`, regardless of its material window.

use chrono::{NaiveDate, Utc};

use crate::{Error, Result, record::Record};

// ─── Axis ────────────────────────────────────────────────────────────────────

/// The temporal axis a request resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalAxis {
  /// Real-world validity: `start_at <= d < end_at` (open end is unbounded).
  Material(NaiveDate),
  /// Administrative history: latest `registration_at <= d`.
  Formal(NaiveDate),
}

impl TemporalAxis {
  /// The default axis when no temporal parameter is given: material, today.
  pub fn today() -> Self {
    Self::Material(Utc::now().date_naive())
  }

  /// Build an axis from the two optional query parameters. Supplying both is
  /// a validation error; supplying neither defaults to material/today.
  pub fn from_params(
    date: Option<NaiveDate>,
    registration_date: Option<NaiveDate>,
  ) -> Result<Self> {
    match (date, registration_date) {
      (Some(_), Some(_)) => Err(Error::BothDatesSupplied),
      (Some(d), None) => Ok(Self::Material(d)),
      (None, Some(d)) => Ok(Self::Formal(d)),
      (None, None) => Ok(Self::today()),
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Whether `record`'s material interval contains `date`.
pub fn covers(record: &Record, date: NaiveDate) -> bool {
  record.start_at <= date && record.end_at.is_none_or(|end| date < end)
}

/// Resolve the single record of an object visible on `axis`, or `None` if no
/// record qualifies (the object is then "not found at that date", which is
/// distinct from the object not existing at all).
pub fn visible_record<'a>(
  records: &'a [Record],
  axis: TemporalAxis,
) -> Option<&'a Record> {
  match axis {
    TemporalAxis::Material(date) => records
      .iter()
      .filter(|r| covers(r, date))
      .max_by_key(|r| r.index),
    // Ties on registration_at break towards the higher index.
    TemporalAxis::Formal(date) => records
      .iter()
      .filter(|r| r.registration_at <= date)
      .max_by_key(|r| (r.registration_at, r.index)),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;

  use super::*;
  use crate::record::Record;

  fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
  }

  fn record(index: u32, start: &str, end: Option<&str>, registered: &str) -> Record {
    Record {
      index,
      version: 1,
      data: json!({}),
      start_at: date(start),
      end_at: end.map(date),
      registration_at: date(registered),
      correction_for: None,
      corrected_by: None,
      geometry: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn material_interval_is_half_open() {
    let r = record(1, "2001-01-01", Some("2005-01-01"), "2001-01-01");
    assert!(!covers(&r, date("2000-12-31")));
    assert!(covers(&r, date("2001-01-01")));
    assert!(covers(&r, date("2004-12-31")));
    assert!(!covers(&r, date("2005-01-01")));
  }

  #[test]
  fn open_record_is_unbounded() {
    let r = record(1, "2001-01-01", None, "2001-01-01");
    assert!(covers(&r, date("2099-01-01")));
    assert!(!covers(&r, date("2000-01-01")));
  }

  #[test]
  fn material_resolution_over_a_correction_chain() {
    // r2 corrects r1 and is the open record.
    let r1 = record(1, "2001-01-01", Some("2005-01-01"), "2001-01-01");
    let r2 = record(2, "2005-01-01", None, "2005-01-01");
    let records = vec![r1, r2];

    let at = |d| visible_record(&records, TemporalAxis::Material(date(d)));
    assert_eq!(at("2003-06-01").map(|r| r.index), Some(1));
    assert_eq!(at("2020-01-01").map(|r| r.index), Some(2));
    assert_eq!(at("1999-01-01"), None);
  }

  #[test]
  fn formal_resolution_ignores_material_window() {
    // r1's material window was superseded, but formally it was the truth
    // until r2 was registered.
    let r1 = record(1, "2001-01-01", Some("2002-01-01"), "2001-01-01");
    let r2 = record(2, "2002-01-01", None, "2010-06-15");
    let records = vec![r1, r2];

    let at = |d| visible_record(&records, TemporalAxis::Formal(date(d)));
    assert_eq!(at("2005-01-01").map(|r| r.index), Some(1));
    assert_eq!(at("2010-06-15").map(|r| r.index), Some(2));
    assert_eq!(at("2000-01-01"), None);
  }

  #[test]
  fn formal_tie_breaks_on_higher_index() {
    let r1 = record(1, "2001-01-01", Some("2001-06-01"), "2001-01-01");
    let r2 = record(2, "2001-06-01", None, "2001-01-01");
    let records = vec![r1, r2];

    let visible = visible_record(&records, TemporalAxis::Formal(date("2001-01-01")));
    assert_eq!(visible.map(|r| r.index), Some(2));
  }

  #[test]
  fn both_axes_is_a_validation_error() {
    let err = TemporalAxis::from_params(
      Some(date("2020-01-01")),
      Some(date("2020-01-01")),
    )
    .unwrap_err();
    assert!(matches!(err, Error::BothDatesSupplied));
  }
}
