//! Review submission and the public listing.
//!
//! Submissions land unapproved and stay invisible until an admin flips the
//! flag — see [`crate::admin`] for the moderation queue.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use crewhub_core::{
  error::AsCoreError,
  review::{NewReview, ReviewWithAuthor},
  store::MarketStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::ApiError};

/// `GET /profiles/:id/reviews` — approved reviews only, newest first.
pub async fn list_for<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ReviewWithAuthor>>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let reviews = state
    .store
    .approved_reviews(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(reviews))
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub rating:  u8,
  #[serde(default)]
  pub comment: String,
}

/// `POST /profiles/:id/reviews`
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(reviewee): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let review = state
    .store
    .submit_review(NewReview {
      reviewer_id: user.account.user_id,
      reviewee_id: reviewee,
      rating:      body.rating,
      comment:     body.comment,
    })
    .await
    .map_err(ApiError::from_store)?;

  Ok((StatusCode::CREATED, Json(review)))
}
