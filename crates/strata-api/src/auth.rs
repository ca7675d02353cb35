//! Token authentication.
//!
//! Every endpoint requires an `Authorization: Token <key>` header; the key is
//! looked up in the store. [`Identity`] is the extractor handlers take to get
//! the resolved caller.

use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use strata_core::{permission::TokenAuth, store::ObjectStore};

use crate::{AppState, error::ApiError};

const SCHEME: &str = "Token ";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity(pub TokenAuth);

impl Identity {
  pub fn key(&self) -> &str {
    &self.0.token
  }

  pub fn is_superuser(&self) -> bool {
    self.0.is_superuser
  }
}

impl<S> FromRequestParts<AppState<S>> for Identity
where
  S: ObjectStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let header = parts
      .headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| {
        ApiError::Unauthorized("missing Authorization header".to_string())
      })?;

    let key = header.strip_prefix(SCHEME).ok_or_else(|| {
      ApiError::Unauthorized("expected 'Token <key>' authorization".to_string())
    })?;

    let token = state
      .store
      .get_token(key)
      .await
      .map_err(ApiError::from_store)?
      .ok_or_else(|| ApiError::Unauthorized("invalid token".to_string()))?;

    Ok(Identity(token))
  }
}
