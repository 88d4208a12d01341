//! Error types for `crewhub-core` — the single domain error taxonomy.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("account not found: {0}")]
  AccountNotFound(Uuid),

  #[error("profile not found: {0}")]
  ProfileNotFound(Uuid),

  #[error("review not found: {0}")]
  ReviewNotFound(Uuid),

  #[error("email already registered: {0}")]
  EmailTaken(String),

  #[error("user {0} has already reviewed user {1}")]
  DuplicateReview(Uuid, Uuid),

  #[error("users cannot review themselves")]
  SelfReview,

  #[error("rating must be between 1 and 5, got {0}")]
  InvalidRating(u8),

  #[error("free accounts are limited to {limit} sent messages")]
  MessageQuotaExceeded { limit: u32 },

  #[error("unknown discriminant for {field}: {value:?}")]
  UnknownDiscriminant { field: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Implemented by backend error types so transport layers can recover the
/// domain error for status mapping without naming a concrete backend.
pub trait AsCoreError {
  /// The wrapped domain error, if this failure is one a client caused.
  fn as_core(&self) -> Option<&Error>;
}

impl AsCoreError for Error {
  fn as_core(&self) -> Option<&Error> { Some(self) }
}
