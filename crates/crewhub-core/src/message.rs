//! Direct messages and the free-tier send quota.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::Profile;

/// Lifetime cap on messages sent by a non-premium account.
pub const FREE_MESSAGE_QUOTA: u32 = 10;

/// A persisted direct message. Immutable except for the read flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub message_id:  Uuid,
  pub sender_id:   Uuid,
  pub receiver_id: Uuid,
  pub content:     String,
  /// Blob-store key of an attachment, e.g. `attachments/<user>-<millis>.pdf`.
  pub file_path:   Option<String>,
  pub is_read:     bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::MarketStore::send_message`].
/// `created_at` and the read flag are set by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub sender_id:   Uuid,
  pub receiver_id: Uuid,
  pub content:     String,
  pub file_path:   Option<String>,
}

/// One entry in a user's conversation list: the counterpart's profile plus
/// enough metadata to order and badge the list. Derived from the flat
/// message table, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
  pub partner:         Profile,
  pub last_message_at: DateTime<Utc>,
  /// Messages from the partner not yet marked read.
  pub unread:          u32,
}

// ─── Quota rule ──────────────────────────────────────────────────────────────

/// Whether a sender with `sent_count` prior messages may send another.
/// Premium accounts are never gated.
pub fn can_send(is_premium: bool, sent_count: u32) -> bool {
  is_premium || sent_count < FREE_MESSAGE_QUOTA
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn free_account_blocked_at_quota() {
    assert!(can_send(false, FREE_MESSAGE_QUOTA - 1));
    assert!(!can_send(false, FREE_MESSAGE_QUOTA));
    assert!(!can_send(false, FREE_MESSAGE_QUOTA + 5));
  }

  #[test]
  fn premium_account_never_blocked() {
    assert!(can_send(true, 0));
    assert!(can_send(true, FREE_MESSAGE_QUOTA));
    assert!(can_send(true, 10_000));
  }
}
