//! Messaging handlers: conversation list, threads, sending, attachments.
//!
//! Sending persists through the store (which enforces the free-tier quota)
//! and then publishes the message on the broadcast channel feeding the
//! WebSocket subscribers — see [`crate::feed`].

use axum::{
  Json,
  body::Bytes,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use crewhub_core::{
  error::AsCoreError,
  message::{Conversation, Message, NewMessage},
  store::MarketStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::ApiError, media};

// ─── Conversations ───────────────────────────────────────────────────────────

/// `GET /messages/conversations` — distinct partners, most recent first.
pub async fn conversations<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<Vec<Conversation>>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let conversations = state
    .store
    .conversations(user.account.user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(conversations))
}

// ─── Thread ──────────────────────────────────────────────────────────────────

/// `GET /messages/:user_id` — the full thread with one partner, oldest
/// first. Fetching marks the partner's messages to the caller as read.
pub async fn thread<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(other): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let me = user.account.user_id;
  let messages = state
    .store
    .thread(me, other)
    .await
    .map_err(ApiError::from_store)?;

  state
    .store
    .mark_read(me, other)
    .await
    .map_err(ApiError::from_store)?;

  Ok(Json(messages))
}

// ─── Send ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendBody {
  #[serde(default)]
  pub content:   String,
  /// Attachment key previously returned by the attachment upload endpoint.
  pub file_path: Option<String>,
}

/// `POST /messages/:user_id`
pub async fn send<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(receiver): Path<Uuid>,
  Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  if body.content.trim().is_empty() && body.file_path.is_none() {
    return Err(ApiError::BadRequest(
      "a message needs text or an attachment".into(),
    ));
  }
  if receiver == user.account.user_id {
    return Err(ApiError::BadRequest("cannot message yourself".into()));
  }

  // Receiver must exist before the quota is spent.
  state
    .store
    .get_profile(receiver)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {receiver}")))?;

  let message = state
    .store
    .send_message(NewMessage {
      sender_id:   user.account.user_id,
      receiver_id: receiver,
      content:     body.content,
      file_path:   body.file_path,
    })
    .await
    .map_err(ApiError::from_store)?;

  // Best-effort fan-out; nobody listening is not an error.
  let _ = state.feed.send(message.clone());

  Ok((StatusCode::CREATED, Json(message)))
}

// ─── Attachments ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
  pub file_path: String,
  pub file_url:  String,
}

/// `POST /messages/attachments` — raw file body; returns the key to pass in
/// a later send.
pub async fn upload_attachment<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<AttachmentResponse>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let content_type = headers
    .get(axum::http::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();

  let key = media::attachment_key(user.account.user_id, content_type)
    .ok_or_else(|| {
      ApiError::BadRequest("attachments must be images or PDFs".into())
    })?;

  state.media.put(&key, &body).await?;

  Ok(Json(AttachmentResponse {
    file_url:  media::public_url(&state.config.base_url, &key),
    file_path: key,
  }))
}
