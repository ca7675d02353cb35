//! JSON REST API for Strata.
//!
//! Exposes an axum [`Router`] backed by any [`strata_core::store::ObjectStore`].
//! TLS and transport concerns are the caller's responsibility; token
//! authentication happens here, against the same store.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api/v2", strata_api::api_router(state))
//! ```

pub mod auth;
pub mod error;
pub mod objects;
pub mod params;
pub mod patch;
pub mod permissions;

use std::sync::Arc;

use axum::{
  Router,
  routing::get,
};
use strata_core::{
  external::{AcceptAll, EventNotifier, NoopNotifier, SchemaValidator},
  store::ObjectStore,
};

pub use error::ApiError;

/// Everything the handlers need: the store, the external collaborators, and
/// the base URL objects are addressed under.
pub struct AppState<S> {
  pub store:     Arc<S>,
  pub validator: Arc<dyn SchemaValidator>,
  pub notifier:  Arc<dyn EventNotifier>,
  pub base_url:  String,
}

impl<S> AppState<S> {
  /// State with the permissive validator and the discarding notifier.
  pub fn new(store: Arc<S>, base_url: impl Into<String>) -> Self {
    Self {
      store,
      validator: Arc::new(AcceptAll),
      notifier: Arc::new(NoopNotifier),
      base_url: base_url.into(),
    }
  }

  pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
    self.validator = validator;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
    self.notifier = notifier;
    self
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      validator: Arc::clone(&self.validator),
      notifier:  Arc::clone(&self.notifier),
      base_url:  self.base_url.clone(),
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: ObjectStore + 'static,
{
  Router::new()
    // Objects
    .route("/objects", get(objects::list::<S>).post(objects::create::<S>))
    .route(
      "/objects/{uuid}",
      get(objects::retrieve::<S>)
        .put(objects::update::<S>)
        .patch(objects::partial_update::<S>)
        .delete(objects::destroy::<S>),
    )
    .route("/objects/{uuid}/history", get(objects::history::<S>))
    .route(
      "/objects/{uuid}/history/{index}",
      get(objects::history_record::<S>),
    )
    // Permissions
    .route("/permissions", get(permissions::list::<S>))
    .with_state(state)
}
