//! Tracing-backed event notifier.
//!
//! The production deployment would push these to a message bus; logging them
//! keeps the seam exercised without one.

use strata_core::external::{Action, EventNotifier};
use uuid::Uuid;

pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
  fn notify(&self, action: Action, object: Uuid, object_type: Uuid) {
    tracing::info!(
      action = action.as_str(),
      %object,
      %object_type,
      "object event"
    );
  }
}
