//! Profile — a user's public-facing record.
//!
//! Profiles share their UUID with the owning account and carry everything
//! the directory, messaging, and review surfaces display: role, skills,
//! availability, the moderation/billing flags, and the review aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// The creator category a profile advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
  YouTuber,
  Editor,
  Designer,
  Other,
}

impl Default for Role {
  fn default() -> Self { Self::Other }
}

/// Whether the creator is currently taking on work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
  Available,
  Busy,
  Unavailable,
}

impl Default for Availability {
  fn default() -> Self { Self::Available }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// A user's public record. `rating` and `review_count` aggregate approved
/// reviews only and are maintained by the store, never written by handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
  /// Matches the owning account's `user_id`.
  pub user_id:         Uuid,
  pub email:           String,
  pub name:            String,
  pub role:            Role,
  /// Ordered list of trimmed, non-empty skill names.
  pub skills:          Vec<String>,
  pub bio:             String,
  /// Blob-store key of the avatar, e.g. `avatars/<user_id>.png`.
  pub avatar_path:     Option<String>,
  /// Label → URL, e.g. `"youtube" → "https://..."`.
  pub portfolio_links: BTreeMap<String, String>,
  pub availability:    Availability,
  pub is_premium:      bool,
  pub is_featured:     bool,
  pub is_verified:     bool,
  /// Mean rating across approved reviews; 0.0 when unreviewed.
  pub rating:          f64,
  pub review_count:    u32,
  pub created_at:      DateTime<Utc>,
}

/// Owner-editable fields; `None` leaves the stored value untouched.
/// Flags and aggregates are deliberately absent — they have their own
/// store operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
  pub name:            Option<String>,
  pub role:            Option<Role>,
  pub skills:          Option<Vec<String>>,
  pub bio:             Option<String>,
  pub portfolio_links: Option<BTreeMap<String, String>>,
  pub availability:    Option<Availability>,
}

// ─── Skills parsing ──────────────────────────────────────────────────────────

/// Parse a comma-separated skills string into an ordered list of trimmed,
/// non-empty entries. `"a, b ,, c"` becomes `["a", "b", "c"]`.
pub fn parse_skills(input: &str) -> Vec<String> {
  input
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn skills_round_trip_from_comma_separated_input() {
    let parsed = parse_skills("Video Editing, Motion Graphics, Color Grading");
    assert_eq!(parsed, vec![
      "Video Editing",
      "Motion Graphics",
      "Color Grading"
    ]);
  }

  #[test]
  fn skills_drop_empty_and_whitespace_entries() {
    assert_eq!(parse_skills(" a ,, b ,   , c,"), vec!["a", "b", "c"]);
    assert!(parse_skills("").is_empty());
    assert!(parse_skills(" ,  , ").is_empty());
  }

  #[test]
  fn skills_preserve_order() {
    assert_eq!(parse_skills("z, a, m"), vec!["z", "a", "m"]);
  }
}
