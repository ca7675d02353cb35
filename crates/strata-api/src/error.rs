//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use strata_core::error::StoreError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not implemented: {0}")]
  NotImplemented(String),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a store backend failure, recovering the domain error it wraps
  /// (wrong uuid, broken correction chain, missing backend capability)
  /// so it keeps its proper status instead of collapsing into a 500.
  pub fn from_store<E>(e: E) -> Self
  where
    E: StoreError + Send + Sync + 'static,
  {
    match e.as_core() {
      Some(core) => classify(core),
      None => Self::Store(Box::new(e)),
    }
  }
}

impl From<strata_core::Error> for ApiError {
  fn from(e: strata_core::Error) -> Self {
    classify(&e)
  }
}

fn classify(core: &strata_core::Error) -> ApiError {
  use strata_core::Error as E;
  let msg = core.to_string();
  match core {
    E::ObjectNotFound(_) | E::ObjectTypeNotFound(_) | E::IndexNotFound { .. } => {
      ApiError::NotFound(msg)
    }
    E::SearchNotSupported => ApiError::NotImplemented(msg),
    E::Serialization(_) => ApiError::Internal(msg),
    _ => ApiError::BadRequest(msg),
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::NotImplemented(m) => (StatusCode::NOT_IMPLEMENTED, m.clone()),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    if status.is_server_error() {
      tracing::error!(%status, error = %message, "request failed");
    }
    (status, Json(json!({ "error": message }))).into_response()
  }
}
