//! Handlers for the profile directory and the profile editor.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/profiles` | `?text=...&role=...&sort=rating\|newest\|reviews` |
//! | `GET`  | `/profiles/:id` | 404 if not found |
//! | `GET`  | `/profiles/me` | lazily creates the row on first visit |
//! | `PUT`  | `/profiles/me` | owner edit; skills arrive comma-separated |
//! | `POST` | `/profiles/me/avatar` | raw image body; replaces the old blob |

use std::collections::BTreeMap;

use axum::{
  Json,
  body::Bytes,
  extract::{Path, Query, State},
  http::HeaderMap,
  response::IntoResponse,
};
use crewhub_core::{
  error::AsCoreError,
  profile::{Availability, Profile, ProfilePatch, Role, parse_skills},
  store::{MarketStore, ProfileQuery, ProfileSort},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::ApiError, media};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  /// Free-text filter over name, bio, and skills.
  pub text:   Option<String>,
  pub role:   Option<Role>,
  pub sort:   Option<ProfileSort>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /profiles[?text=...][&role=...][&sort=...]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Profile>>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let query = ProfileQuery {
    text:   params.text,
    role:   params.role,
    sort:   params.sort.unwrap_or(ProfileSort::Rating),
    limit:  params.limit,
    offset: params.offset,
  };

  let profiles = state
    .store
    .list_profiles(&query)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(profiles))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /profiles/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Profile>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let profile = state
    .store
    .get_profile(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {id}")))?;
  Ok(Json(profile))
}

/// `GET /profiles/me`
pub async fn me<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<Profile>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let profile = state
    .store
    .ensure_profile(user.account.user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(profile))
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct UpdateBody {
  pub name:            Option<String>,
  pub role:            Option<Role>,
  /// Comma-separated, e.g. `"Video Editing, Motion Graphics"`.
  pub skills:          Option<String>,
  pub bio:             Option<String>,
  pub portfolio_links: Option<BTreeMap<String, String>>,
  pub availability:    Option<Availability>,
}

/// `PUT /profiles/me` — last write wins; no concurrency token.
pub async fn update_me<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Json(body): Json<UpdateBody>,
) -> Result<Json<Profile>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let patch = ProfilePatch {
    name:            body.name,
    role:            body.role,
    skills:          body.skills.as_deref().map(parse_skills),
    bio:             body.bio,
    portfolio_links: body.portfolio_links,
    availability:    body.availability,
  };

  let profile = state
    .store
    .update_profile(user.account.user_id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(profile))
}

// ─── Avatar ──────────────────────────────────────────────────────────────────

/// Avatars above this size are rejected.
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
  pub avatar_path: String,
  pub avatar_url:  String,
}

/// `POST /profiles/me/avatar` — raw image bytes; the previous blob is
/// deleted once the replacement is stored.
pub async fn upload_avatar<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  if body.len() > MAX_AVATAR_BYTES {
    return Err(ApiError::BadRequest("file size must be less than 5MB".into()));
  }

  let content_type = headers
    .get(axum::http::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();
  if !content_type.starts_with("image/") {
    return Err(ApiError::BadRequest("please upload an image file".into()));
  }

  let key = media::avatar_key(user.account.user_id, content_type)
    .ok_or_else(|| ApiError::BadRequest("unsupported image type".into()))?;

  state.media.put(&key, &body).await?;

  let old = state
    .store
    .set_avatar(user.account.user_id, Some(key.clone()))
    .await
    .map_err(ApiError::from_store)?;

  // Same key means the blob was overwritten in place.
  if let Some(old) = old.filter(|old| old != &key) {
    state.media.delete(&old).await?;
  }

  Ok(Json(AvatarResponse {
    avatar_url:  media::public_url(&state.config.base_url, &key),
    avatar_path: key,
  }))
}
