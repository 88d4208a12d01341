//! The `MarketStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `crewhub-store-sqlite`). Higher layers (`crewhub-api`, the server binary)
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  account::{NewAccount, OAuthState, Session, UserAccount},
  billing::{BillingEvent, EventOutcome, Subscription},
  message::{Conversation, Message, NewMessage},
  profile::{Profile, ProfilePatch, Role},
  review::{NewReview, PendingReview, Review, ReviewWithAuthor},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Sort key for [`MarketStore::list_profiles`]. Featured profiles always
/// order first regardless of the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSort {
  #[default]
  Rating,
  Newest,
  Reviews,
}

/// Parameters for [`MarketStore::list_profiles`].
#[derive(Debug, Clone, Default)]
pub struct ProfileQuery {
  /// Case-insensitive free-text filter over name, bio, and skills.
  pub text:   Option<String>,
  pub role:   Option<Role>,
  pub sort:   ProfileSort,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AdminStats {
  pub total_users:          u64,
  pub premium_users:        u64,
  pub featured_users:       u64,
  pub active_subscriptions: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Crewhub storage backend.
///
/// Multi-step mutations (account + profile creation, review approval with
/// aggregate recomputation, billing event application, cascade user
/// deletion) are transactional: either every write lands or none do.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MarketStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts & sessions ───────────────────────────────────────────────

  /// Create an account and its initial profile in one transaction.
  /// Fails with an email-taken error if the address is registered.
  fn create_account(
    &self,
    input: NewAccount,
  ) -> impl Future<Output = Result<(UserAccount, Profile), Self::Error>> + Send + '_;

  fn account_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + 'a;

  fn account_by_id(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + '_;

  /// Persist a session for `user_id`. `token_digest` is the SHA-256 hex
  /// digest of the opaque bearer token; the token itself is never stored.
  fn create_session(
    &self,
    user_id: Uuid,
    token_digest: String,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Resolve a session token digest to its account. Expired or unknown
  /// digests resolve to `None`.
  fn session_account(
    &self,
    token_digest: String,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + '_;

  fn delete_session(
    &self,
    token_digest: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Park OAuth redirect state (CSRF state → PKCE verifier) until the
  /// provider calls back.
  fn put_oauth_state(
    &self,
    state: OAuthState,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Consume parked OAuth state. Each state string resolves at most once.
  fn take_oauth_state(
    &self,
    state: String,
  ) -> impl Future<Output = Result<Option<OAuthState>, Self::Error>> + Send + '_;

  // ── Profiles ──────────────────────────────────────────────────────────

  fn get_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// Return the user's profile, creating a default one (role `Other`, empty
  /// skills, available) from the account record if none exists yet. Covers
  /// accounts whose profile creation was skipped at sign-up.
  fn ensure_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  fn list_profiles<'a>(
    &'a self,
    query: &'a ProfileQuery,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send + 'a;

  /// Apply an owner edit. Fields left `None` keep their stored values.
  fn update_profile(
    &self,
    user_id: Uuid,
    patch: ProfilePatch,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  /// Replace the avatar blob key, returning the previous key (so the caller
  /// can delete the old blob).
  fn set_avatar(
    &self,
    user_id: Uuid,
    avatar_path: Option<String>,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn set_verified(
    &self,
    user_id: Uuid,
    verified: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_featured(
    &self,
    user_id: Uuid,
    featured: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete a user and everything reachable from them: messages in either
  /// direction, reviews in either role (recomputing the counterparties'
  /// aggregates), subscriptions, sessions, profile, and account. One
  /// transaction.
  fn delete_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Total messages ever sent by `user_id`, for the free-tier quota.
  fn sent_message_count(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  /// Persist a message. Enforces the free-tier quota against the sender's
  /// premium flag and prior sent count inside the store, so the gate cannot
  /// be bypassed by a client.
  fn send_message(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<Message, Self::Error>> + Send + '_;

  /// Distinct conversation partners for `user_id`, most recent first.
  fn conversations(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>> + Send + '_;

  /// All messages between `user_id` and `other_id`, oldest first.
  fn thread(
    &self,
    user_id: Uuid,
    other_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  /// Mark all messages from `sender_id` to `receiver_id` as read.
  /// Returns the number of rows flipped.
  fn mark_read(
    &self,
    receiver_id: Uuid,
    sender_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Reviews ───────────────────────────────────────────────────────────

  /// Persist a review with the approval flag unset. Fails on a duplicate
  /// (reviewer, reviewee) pair.
  fn submit_review(
    &self,
    input: NewReview,
  ) -> impl Future<Output = Result<Review, Self::Error>> + Send + '_;

  /// Approved reviews for a profile, newest first, authors embedded.
  fn approved_reviews(
    &self,
    reviewee_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ReviewWithAuthor>, Self::Error>> + Send + '_;

  /// The moderation queue: unapproved reviews, oldest first.
  fn pending_reviews(
    &self,
  ) -> impl Future<Output = Result<Vec<PendingReview>, Self::Error>> + Send + '_;

  /// Approve a review and recompute the reviewee's aggregate rating and
  /// count in the same transaction.
  fn approve_review(
    &self,
    review_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete a review; if it was approved, the reviewee's aggregate is
  /// recomputed in the same transaction.
  fn delete_review(
    &self,
    review_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Billing ───────────────────────────────────────────────────────────

  /// Apply a webhook event transactionally. `event_id` is the provider's
  /// event identifier; ids already in the processed-event ledger are
  /// acknowledged without reapplying.
  fn apply_billing_event(
    &self,
    event_id: String,
    event: BillingEvent,
  ) -> impl Future<Output = Result<EventOutcome, Self::Error>> + Send + '_;

  fn subscription_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  // ── Admin ─────────────────────────────────────────────────────────────

  fn admin_stats(
    &self,
  ) -> impl Future<Output = Result<AdminStats, Self::Error>> + Send + '_;
}
