//! Narrow contracts for the external collaborators the core consumes:
//! schema validation and event notification. Both are dyn-safe so the
//! transport layer can inject implementations at startup.

use serde_json::Value;
use uuid::Uuid;

use crate::object::ObjectType;

// ─── Schema validation ───────────────────────────────────────────────────────

/// One schema violation, with enough structure to name the offending field.
#[derive(Debug, Clone)]
pub struct Violation {
  pub path:    String,
  pub message: String,
}

/// Validates a record payload against the type's schema at a given version.
/// Called before any append; on failure the whole write is rejected.
pub trait SchemaValidator: Send + Sync {
  fn validate(
    &self,
    object_type: &ObjectType,
    version: u16,
    data: &Value,
  ) -> Result<(), Vec<Violation>>;
}

/// Accepts every payload. Real validation lives in an external registry; this
/// is the default wiring when none is configured.
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
  fn validate(
    &self,
    _object_type: &ObjectType,
    _version: u16,
    _data: &Value,
  ) -> Result<(), Vec<Violation>> {
    Ok(())
  }
}

// ─── Event notification ──────────────────────────────────────────────────────

/// The mutation that triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Create,
  Update,
  PartialUpdate,
  Destroy,
}

impl Action {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::PartialUpdate => "partial_update",
      Self::Destroy => "destroy",
    }
  }
}

/// Fire-and-forget notification sink, invoked once per successful mutation
/// after the transaction commits. Implementations must not block the caller.
pub trait EventNotifier: Send + Sync {
  fn notify(&self, action: Action, object: Uuid, object_type: Uuid);
}

/// Discards all notifications.
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
  fn notify(&self, _action: Action, _object: Uuid, _object_type: Uuid) {}
}
