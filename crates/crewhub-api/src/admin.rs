//! Admin console: stats, the review moderation queue, and user management.
//!
//! Every route takes the [`AdminUser`] extractor, so authorization is
//! enforced server-side on each request — not merely hidden in a client.

use axum::{
  Json,
  extract::{FromRequestParts, Path, State},
  http::{StatusCode, request::Parts},
  response::IntoResponse,
};
use crewhub_core::{
  error::AsCoreError,
  review::PendingReview,
  store::MarketStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::ApiError};

// ─── Authorization ───────────────────────────────────────────────────────────

/// A signed-in user whose email appears in the configured admin list.
pub struct AdminUser(pub CurrentUser);

impl<S> FromRequestParts<AppState<S>> for AdminUser
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let user = CurrentUser::from_request_parts(parts, state).await?;

    let email = user.account.email.to_lowercase();
    let is_admin = state
      .config
      .admin_emails
      .iter()
      .any(|a| a.to_lowercase() == email);

    if !is_admin {
      return Err(ApiError::Forbidden("admin access required".into()));
    }
    Ok(AdminUser(user))
  }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatsResponse {
  pub total_users:    u64,
  pub premium_users:  u64,
  pub featured_users: u64,
  pub total_revenue:  f64,
}

/// `GET /admin/stats`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
) -> Result<Json<StatsResponse>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let stats = state
    .store
    .admin_stats()
    .await
    .map_err(ApiError::from_store)?;

  Ok(Json(StatsResponse {
    total_users:    stats.total_users,
    premium_users:  stats.premium_users,
    featured_users: stats.featured_users,
    total_revenue:  stats.active_subscriptions as f64
      * state.config.billing.plan_price_usd,
  }))
}

// ─── Moderation queue ────────────────────────────────────────────────────────

/// `GET /admin/reviews` — unapproved reviews, oldest first.
pub async fn pending_reviews<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
) -> Result<Json<Vec<PendingReview>>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let pending = state
    .store
    .pending_reviews()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(pending))
}

/// `POST /admin/reviews/:id/approve`
pub async fn approve_review<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  state
    .store
    .approve_review(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /admin/reviews/:id`
pub async fn delete_review<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  state
    .store
    .delete_review(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── User management ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifiedBody {
  pub verified: bool,
}

/// `PUT /admin/users/:id/verify`
pub async fn set_verified<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<Uuid>,
  Json(body): Json<VerifiedBody>,
) -> Result<StatusCode, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  state
    .store
    .set_verified(id, body.verified)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct FeaturedBody {
  pub featured: bool,
}

/// `PUT /admin/users/:id/feature`
pub async fn set_featured<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<Uuid>,
  Json(body): Json<FeaturedBody>,
) -> Result<StatusCode, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  state
    .store
    .set_featured(id, body.featured)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /admin/users/:id` — cascades to the user's messages, reviews,
/// subscriptions, sessions, profile, and account.
pub async fn delete_user<S>(
  State(state): State<AppState<S>>,
  admin: AdminUser,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  if id == admin.0.account.user_id {
    return Err(ApiError::BadRequest("admins cannot delete themselves".into()));
  }

  state
    .store
    .delete_user(id)
    .await
    .map_err(ApiError::from_store)?;

  tracing::info!(user = %id, admin = %admin.0.account.user_id, "user deleted");
  Ok(StatusCode::NO_CONTENT)
}
