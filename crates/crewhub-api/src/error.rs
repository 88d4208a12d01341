//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every handler failure funnels through [`ApiError`]; the status mapping
//! here is the single place domain errors become HTTP semantics.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use crewhub_core::error::AsCoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The free-tier message cap; carries the user-facing upgrade notice.
  #[error("{0}")]
  QuotaExceeded(String),

  /// A call to an external collaborator (payment provider, OAuth provider)
  /// failed.
  #[error("upstream error: {0}")]
  Upstream(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a backend failure onto HTTP semantics, recovering the domain error
  /// where there is one.
  pub fn from_store<E>(err: E) -> Self
  where
    E: std::error::Error + AsCoreError + Send + Sync + 'static,
  {
    use crewhub_core::Error as Core;

    match err.as_core() {
      Some(Core::AccountNotFound(id)) => Self::NotFound(format!("account {id}")),
      Some(Core::ProfileNotFound(id)) => Self::NotFound(format!("profile {id}")),
      Some(Core::ReviewNotFound(id)) => Self::NotFound(format!("review {id}")),
      Some(Core::EmailTaken(email)) => {
        Self::Conflict(format!("email already registered: {email}"))
      }
      Some(Core::DuplicateReview(..)) => {
        Self::Conflict("you have already reviewed this user".into())
      }
      Some(Core::MessageQuotaExceeded { limit }) => Self::QuotaExceeded(format!(
        "free accounts are limited to {limit} messages; upgrade to premium \
         for unlimited messaging"
      )),
      Some(Core::SelfReview) => {
        Self::BadRequest("users cannot review themselves".into())
      }
      Some(Core::InvalidRating(r)) => {
        Self::BadRequest(format!("rating must be between 1 and 5, got {r}"))
      }
      _ => Self::Store(Box::new(err)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::QuotaExceeded(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
