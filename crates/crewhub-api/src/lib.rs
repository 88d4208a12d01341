//! HTTP layer for the Crewhub marketplace.
//!
//! Exposes an axum [`Router`] backed by any
//! [`crewhub_core::store::MarketStore`]: JSON REST handlers for profiles,
//! messaging, reviews, and the admin console, bearer-token sessions, an
//! OAuth redirect flow, a WebSocket feed for incoming messages, a disk-backed
//! media store, and the payment-provider webhook endpoint.

pub mod admin;
pub mod auth;
pub mod billing;
pub mod error;
pub mod feed;
pub mod media;
pub mod messages;
pub mod oauth;
pub mod profiles;
pub mod reviews;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{delete, get, post, put},
};
use crewhub_core::{error::AsCoreError, message::Message, store::MarketStore};
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use media::MediaStore;

/// Uploads larger than this are rejected before reaching a handler.
pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  /// Public origin used to derive media URLs, e.g. `https://crewhub.example`.
  pub base_url:   String,
  pub store_path: PathBuf,
  /// Root directory of the disk blob store.
  pub media_dir:  PathBuf,
  /// Emails granted access to the admin console routes.
  #[serde(default)]
  pub admin_emails: Vec<String>,
  /// Bearer-session lifetime in hours.
  #[serde(default = "default_session_ttl")]
  pub session_ttl_hours: u32,
  pub billing: BillingConfig,
  /// Optional OAuth provider; when absent the redirect routes return 404.
  pub oauth: Option<OAuthConfig>,
}

fn default_session_ttl() -> u32 { 24 * 30 }

/// Payment-provider settings.
#[derive(Deserialize, Clone)]
pub struct BillingConfig {
  /// API key used for checkout-session creation.
  pub secret_key:     String,
  /// Webhook signing secret shared with the provider.
  pub webhook_secret: String,
  /// Price id of the premium plan.
  pub price_id:       String,
  /// Monthly plan price, for the admin revenue figure.
  pub plan_price_usd: f64,
  pub success_url:    String,
  pub cancel_url:     String,
}

/// OAuth provider endpoints and credentials.
#[derive(Deserialize, Clone)]
pub struct OAuthConfig {
  pub client_id:     String,
  pub client_secret: String,
  pub auth_url:      String,
  pub token_url:     String,
  /// Endpoint returning `{"email": ..., "name": ...}` for a bearer token.
  pub userinfo_url:  String,
  pub redirect_url:  String,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: MarketStore> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
  pub media:  Arc<MediaStore>,
  /// Fan-out channel for newly persisted messages; the WebSocket feed
  /// subscribes and filters by receiver.
  pub feed:   broadcast::Sender<Message>,
}

impl<S: MarketStore> AppState<S> {
  pub fn new(store: S, config: ServerConfig) -> Self {
    let media = MediaStore::new(config.media_dir.clone());
    Self {
      store:  Arc::new(store),
      config: Arc::new(config),
      media:  Arc::new(media),
      feed:   broadcast::channel(256).0,
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  Router::new()
    // Identity & sessions
    .route("/auth/signup", post(auth::signup::<S>))
    .route("/auth/signin", post(auth::signin::<S>))
    .route("/auth/signout", post(auth::signout::<S>))
    .route("/auth/me", get(auth::me::<S>))
    .route("/auth/oauth/login", get(oauth::login::<S>))
    .route("/auth/oauth/callback", get(oauth::callback::<S>))
    // Profile directory & editor
    .route("/profiles", get(profiles::list::<S>))
    .route("/profiles/me", get(profiles::me::<S>).put(profiles::update_me::<S>))
    .route("/profiles/me/avatar", post(profiles::upload_avatar::<S>))
    .route("/profiles/{id}", get(profiles::get_one::<S>))
    // Reviews
    .route(
      "/profiles/{id}/reviews",
      get(reviews::list_for::<S>).post(reviews::submit::<S>),
    )
    // Messaging
    .route("/messages/conversations", get(messages::conversations::<S>))
    .route("/messages/feed", get(feed::subscribe::<S>))
    .route("/messages/attachments", post(messages::upload_attachment::<S>))
    .route(
      "/messages/{user_id}",
      get(messages::thread::<S>).post(messages::send::<S>),
    )
    // Billing
    .route("/billing/checkout", post(billing::create_checkout::<S>))
    .route("/billing/subscription", get(billing::subscription::<S>))
    .route("/billing/webhook", post(billing::webhook::<S>))
    // Media
    .route("/media/{*key}", get(media::serve::<S>))
    // Admin console
    .route("/admin/stats", get(admin::stats::<S>))
    .route("/admin/reviews", get(admin::pending_reviews::<S>))
    .route("/admin/reviews/{id}/approve", post(admin::approve_review::<S>))
    .route("/admin/reviews/{id}", delete(admin::delete_review::<S>))
    .route("/admin/users/{id}/verify", put(admin::set_verified::<S>))
    .route("/admin/users/{id}/feature", put(admin::set_featured::<S>))
    .route("/admin/users/{id}", delete(admin::delete_user::<S>))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
