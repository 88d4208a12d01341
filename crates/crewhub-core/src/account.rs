//! User accounts and sessions.
//!
//! An account is the authentication identity; its public face is the
//! [`Profile`](crate::profile::Profile) sharing the same UUID. Accounts
//! created through the OAuth flow carry no password hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authentication identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
  pub user_id:       Uuid,
  pub email:         String,
  /// Argon2 PHC string; `None` for OAuth-only accounts.
  #[serde(skip_serializing, default)]
  pub password_hash: Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::MarketStore::create_account`].
/// The account and its initial profile are created in one transaction.
#[derive(Debug, Clone)]
pub struct NewAccount {
  pub email:         String,
  /// Argon2 PHC string, already hashed by the caller. `None` for OAuth.
  pub password_hash: Option<String>,
  pub name:          String,
  pub role:          crate::profile::Role,
}

/// A bearer session. Only the SHA-256 digest of the token is ever stored;
/// the opaque token itself exists client-side only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub token_digest: String,
  pub user_id:      Uuid,
  pub created_at:   DateTime<Utc>,
  pub expires_at:   DateTime<Utc>,
}

/// Server-side state parked between the OAuth redirect and its callback.
/// Keyed by the CSRF state string; consumed exactly once.
#[derive(Debug, Clone)]
pub struct OAuthState {
  pub state:         String,
  pub pkce_verifier: String,
  pub return_url:    Option<String>,
  pub created_at:    DateTime<Utc>,
}
