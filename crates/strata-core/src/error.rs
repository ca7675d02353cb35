//! Error types for `strata-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  // ── Entities ──────────────────────────────────────────────────────────

  #[error("object not found: {0}")]
  ObjectNotFound(Uuid),

  #[error("object type not found: {0:?}")]
  ObjectTypeNotFound(String),

  #[error("record with index {index} not found on object {object}")]
  IndexNotFound { object: Uuid, index: u32 },

  // ── Correction chain ──────────────────────────────────────────────────

  #[error("record {index} is already corrected by record {by}")]
  AlreadyCorrected { index: u32, by: u32 },

  #[error("a record cannot correct itself")]
  SelfCorrection,

  // ── Filter DSL ────────────────────────────────────────────────────────

  #[error("invalid filter expression shape: {0:?}")]
  InvalidFilterShape(String),

  #[error("unknown filter operator: {0:?}")]
  UnknownOperator(String),

  #[error("operator {operator:?} needs a numeric or ISO-date value, got {value:?}")]
  UnsupportedComparisonType { operator: String, value: String },

  // ── Temporal resolution ───────────────────────────────────────────────

  #[error("'date' and 'registrationDate' parameters can't be used in the same request")]
  BothDatesSupplied,

  // ── Field authorization ───────────────────────────────────────────────

  #[error("fields in the configured authorization are absent in the data: {0}")]
  FieldsAbsentInData(String),

  #[error("'fields' query parameter has invalid or unauthorized values: {0}")]
  UnauthorizedFieldSelection(String),

  #[error("you are not allowed to sort on following fields: {0}")]
  UnauthorizedOrderingFields(String),

  // ── Writes ────────────────────────────────────────────────────────────

  #[error("object type {0} does not allow geometry")]
  GeometryNotAllowed(Uuid),

  #[error("the object type of an existing object is immutable")]
  TypeImmutable,

  // ── Store capability ──────────────────────────────────────────────────

  /// The deployed backend lacks the structural JSON search capability
  /// needed for the contains-anywhere mode. Operator-actionable.
  #[error("structural data search is not supported by the deployed store backend")]
  SearchNotSupported,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Implemented by store backend error types so the transport layer can
/// recover the domain error a backend failure wraps, if any.
pub trait StoreError: std::error::Error {
  fn as_core(&self) -> Option<&Error>;
}
