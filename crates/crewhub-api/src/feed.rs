//! WebSocket feed of incoming messages.
//!
//! Every persisted message is published on the state's broadcast channel;
//! each connected client receives the ones addressed to it. Slow consumers
//! miss messages rather than applying backpressure, and reconnection is the
//! client's responsibility.

use axum::{
  extract::{
    Query, State, WebSocketUpgrade,
    ws::{Message as WsMessage, WebSocket},
  },
  http::HeaderMap,
  response::Response,
};
use crewhub_core::{error::AsCoreError, message::Message, store::MarketStore};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{AppState, auth, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct FeedParams {
  /// Session token, for clients that cannot set headers on the upgrade
  /// request (browsers).
  pub token: Option<String>,
}

/// `GET /messages/feed` — upgrade to a WebSocket delivering the caller's
/// incoming messages as JSON text frames. Authenticates from the bearer
/// header or a `token` query parameter.
pub async fn subscribe<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<FeedParams>,
  headers: HeaderMap,
  ws: WebSocketUpgrade,
) -> Result<Response, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let token = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|h| h.strip_prefix("Bearer ").map(str::to_owned))
    .or(params.token)
    .ok_or(ApiError::Unauthorized)?;

  let account = state
    .store
    .session_account(auth::token_digest(&token))
    .await
    .map_err(ApiError::from_store)?
    .ok_or(ApiError::Unauthorized)?;

  let rx = state.feed.subscribe();
  let user_id = account.user_id;
  Ok(ws.on_upgrade(move |socket| run(socket, rx, user_id)))
}

async fn run(socket: WebSocket, mut rx: broadcast::Receiver<Message>, user_id: Uuid) {
  let (mut sender, mut receiver) = socket.split();

  loop {
    tokio::select! {
      // Clients don't send anything meaningful; we only watch for the
      // stream closing.
      incoming = receiver.next() => {
        match incoming {
          None | Some(Err(_)) => break,
          Some(Ok(_)) => {}
        }
      }

      event = rx.recv() => {
        match event {
          Ok(msg) if msg.receiver_id == user_id => {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
              break;
            }
          }
          // Addressed to someone else.
          Ok(_) => {}
          // Fell behind the channel; skip the lost range and continue.
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(user = %user_id, skipped, "message feed lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    }
  }
}
