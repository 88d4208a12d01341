//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields (skills,
//! portfolio links) are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings. Enum columns store the same discriminants
//! the serde representations use.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use crewhub_core::{
  account::UserAccount,
  billing::{PlanType, Subscription, SubscriptionStatus},
  message::Message,
  profile::{Availability, Profile, Role},
  review::Review,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn encode_role(r: Role) -> &'static str {
  match r {
    Role::YouTuber => "YouTuber",
    Role::Editor => "Editor",
    Role::Designer => "Designer",
    Role::Other => "Other",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "YouTuber" => Ok(Role::YouTuber),
    "Editor" => Ok(Role::Editor),
    "Designer" => Ok(Role::Designer),
    "Other" => Ok(Role::Other),
    other => Err(unknown("role", other)),
  }
}

// ─── Availability ────────────────────────────────────────────────────────────

pub fn encode_availability(a: Availability) -> &'static str {
  match a {
    Availability::Available => "available",
    Availability::Busy => "busy",
    Availability::Unavailable => "unavailable",
  }
}

pub fn decode_availability(s: &str) -> Result<Availability> {
  match s {
    "available" => Ok(Availability::Available),
    "busy" => Ok(Availability::Busy),
    "unavailable" => Ok(Availability::Unavailable),
    other => Err(unknown("availability", other)),
  }
}

// ─── Subscription status / plan ──────────────────────────────────────────────

pub fn encode_sub_status(s: SubscriptionStatus) -> &'static str {
  match s {
    SubscriptionStatus::Active => "active",
    SubscriptionStatus::Canceled => "canceled",
  }
}

pub fn decode_sub_status(s: &str) -> Result<SubscriptionStatus> {
  match s {
    "active" => Ok(SubscriptionStatus::Active),
    "canceled" => Ok(SubscriptionStatus::Canceled),
    other => Err(unknown("subscription status", other)),
  }
}

pub fn encode_plan(p: PlanType) -> &'static str {
  match p {
    PlanType::Premium => "premium",
  }
}

pub fn decode_plan(s: &str) -> Result<PlanType> {
  match s {
    "premium" => Ok(PlanType::Premium),
    other => Err(unknown("plan type", other)),
  }
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_skills(skills: &[String]) -> Result<String> {
  Ok(serde_json::to_string(skills)?)
}

pub fn decode_skills(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_links(links: &BTreeMap<String, String>) -> Result<String> {
  Ok(serde_json::to_string(links)?)
}

pub fn decode_links(s: &str) -> Result<BTreeMap<String, String>> {
  Ok(serde_json::from_str(s)?)
}

fn unknown(field: &'static str, value: &str) -> Error {
  Error::Core(crewhub_core::Error::UnknownDiscriminant {
    field,
    value: value.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `accounts` row.
pub struct RawAccount {
  pub user_id:       String,
  pub email:         String,
  pub password_hash: Option<String>,
  pub created_at:    String,
}

impl RawAccount {
  pub const COLUMNS: &'static str = "user_id, email, password_hash, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:       row.get(0)?,
      email:         row.get(1)?,
      password_hash: row.get(2)?,
      created_at:    row.get(3)?,
    })
  }

  pub fn into_account(self) -> Result<UserAccount> {
    Ok(UserAccount {
      user_id:       decode_uuid(&self.user_id)?,
      email:         self.email,
      password_hash: self.password_hash,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub user_id:         String,
  pub email:           String,
  pub name:            String,
  pub role:            String,
  pub skills:          String,
  pub bio:             String,
  pub avatar_path:     Option<String>,
  pub portfolio_links: String,
  pub availability:    String,
  pub is_premium:      bool,
  pub is_featured:     bool,
  pub is_verified:     bool,
  pub rating:          f64,
  pub review_count:    i64,
  pub created_at:      String,
}

impl RawProfile {
  pub const COLUMNS: &'static str = "user_id, email, name, role, skills, bio, \
     avatar_path, portfolio_links, availability, is_premium, is_featured, \
     is_verified, rating, review_count, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:         row.get(0)?,
      email:           row.get(1)?,
      name:            row.get(2)?,
      role:            row.get(3)?,
      skills:          row.get(4)?,
      bio:             row.get(5)?,
      avatar_path:     row.get(6)?,
      portfolio_links: row.get(7)?,
      availability:    row.get(8)?,
      is_premium:      row.get(9)?,
      is_featured:     row.get(10)?,
      is_verified:     row.get(11)?,
      rating:          row.get(12)?,
      review_count:    row.get(13)?,
      created_at:      row.get(14)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      user_id:         decode_uuid(&self.user_id)?,
      email:           self.email,
      name:            self.name,
      role:            decode_role(&self.role)?,
      skills:          decode_skills(&self.skills)?,
      bio:             self.bio,
      avatar_path:     self.avatar_path,
      portfolio_links: decode_links(&self.portfolio_links)?,
      availability:    decode_availability(&self.availability)?,
      is_premium:      self.is_premium,
      is_featured:     self.is_featured,
      is_verified:     self.is_verified,
      rating:          self.rating,
      review_count:    self.review_count as u32,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `messages` row.
pub struct RawMessage {
  pub message_id:  String,
  pub sender_id:   String,
  pub receiver_id: String,
  pub content:     String,
  pub file_path:   Option<String>,
  pub is_read:     bool,
  pub created_at:  String,
}

impl RawMessage {
  pub const COLUMNS: &'static str =
    "message_id, sender_id, receiver_id, content, file_path, is_read, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:  row.get(0)?,
      sender_id:   row.get(1)?,
      receiver_id: row.get(2)?,
      content:     row.get(3)?,
      file_path:   row.get(4)?,
      is_read:     row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id:  decode_uuid(&self.message_id)?,
      sender_id:   decode_uuid(&self.sender_id)?,
      receiver_id: decode_uuid(&self.receiver_id)?,
      content:     self.content,
      file_path:   self.file_path,
      is_read:     self.is_read,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `reviews` row.
pub struct RawReview {
  pub review_id:   String,
  pub reviewer_id: String,
  pub reviewee_id: String,
  pub rating:      i64,
  pub comment:     String,
  pub is_approved: bool,
  pub created_at:  String,
}

impl RawReview {
  pub const COLUMNS: &'static str =
    "review_id, reviewer_id, reviewee_id, rating, comment, is_approved, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      review_id:   row.get(0)?,
      reviewer_id: row.get(1)?,
      reviewee_id: row.get(2)?,
      rating:      row.get(3)?,
      comment:     row.get(4)?,
      is_approved: row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_review(self) -> Result<Review> {
    Ok(Review {
      review_id:   decode_uuid(&self.review_id)?,
      reviewer_id: decode_uuid(&self.reviewer_id)?,
      reviewee_id: decode_uuid(&self.reviewee_id)?,
      rating:      self.rating as u8,
      comment:     self.comment,
      is_approved: self.is_approved,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub subscription_id:          String,
  pub user_id:                  String,
  pub provider_customer_id:     String,
  pub provider_subscription_id: String,
  pub status:                   String,
  pub plan:                     String,
  pub created_at:               String,
}

impl RawSubscription {
  pub const COLUMNS: &'static str = "subscription_id, user_id, \
     provider_customer_id, provider_subscription_id, status, plan, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id:          row.get(0)?,
      user_id:                  row.get(1)?,
      provider_customer_id:     row.get(2)?,
      provider_subscription_id: row.get(3)?,
      status:                   row.get(4)?,
      plan:                     row.get(5)?,
      created_at:               row.get(6)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id:          decode_uuid(&self.subscription_id)?,
      user_id:                  decode_uuid(&self.user_id)?,
      provider_customer_id:     self.provider_customer_id,
      provider_subscription_id: self.provider_subscription_id,
      status:                   decode_sub_status(&self.status)?,
      plan:                     decode_plan(&self.plan)?,
      created_at:               decode_dt(&self.created_at)?,
    })
  }
}
