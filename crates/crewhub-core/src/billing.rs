//! Subscriptions and payment-provider webhook events.
//!
//! The provider is the source of truth for billing state; this module models
//! the two event types the system consumes and the subscription record they
//! maintain. Applying an event is transactional and idempotent — see
//! [`crate::store::MarketStore::apply_billing_event`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Subscription ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
  Active,
  Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
  Premium,
}

/// A billing subscription owned by one user. Created by a checkout-completed
/// event, flipped to canceled by a subscription-deleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id:          Uuid,
  pub user_id:                  Uuid,
  /// The provider's customer identifier.
  pub provider_customer_id:     String,
  /// The provider's subscription identifier; unique across the table.
  pub provider_subscription_id: String,
  pub status:                   SubscriptionStatus,
  pub plan:                     PlanType,
  pub created_at:               DateTime<Utc>,
}

// ─── Webhook events ──────────────────────────────────────────────────────────

/// The decoded, validated payload of a payment-provider webhook event.
/// Only the two types the system reacts to are modeled; everything else is
/// acknowledged and dropped at the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
  /// `checkout.session.completed` — the user finished paying. Activates a
  /// premium subscription and sets the profile's premium flag.
  CheckoutCompleted {
    user_id:                  Uuid,
    provider_customer_id:     String,
    provider_subscription_id: String,
  },
  /// `customer.subscription.deleted` — the subscription ended. Marks it
  /// canceled and clears the owner's premium and featured flags.
  SubscriptionDeleted { provider_subscription_id: String },
}

/// Outcome of [`crate::store::MarketStore::apply_billing_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
  Applied,
  /// The event id was seen before; nothing was written.
  AlreadyProcessed,
  /// The event referenced a subscription or user this store has never seen;
  /// acknowledged without writes.
  NoMatch,
}
