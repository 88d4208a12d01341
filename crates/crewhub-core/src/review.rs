//! Reviews and the moderation gate.
//!
//! A submitted review is persisted immediately but stays invisible to the
//! public listing until an admin approves it. Only approved reviews count
//! toward a profile's aggregate rating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, profile::Profile};

/// A rating left by one user for another. One review per (reviewer,
/// reviewee) pair; the store enforces uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
  pub review_id:   Uuid,
  pub reviewer_id: Uuid,
  pub reviewee_id: Uuid,
  /// 1–5 inclusive.
  pub rating:      u8,
  pub comment:     String,
  pub is_approved: bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::MarketStore::submit_review`].
#[derive(Debug, Clone)]
pub struct NewReview {
  pub reviewer_id: Uuid,
  pub reviewee_id: Uuid,
  pub rating:      u8,
  pub comment:     String,
}

impl NewReview {
  /// Reject out-of-range ratings and self-reviews before they reach a store.
  pub fn validate(&self) -> Result<()> {
    if !(1..=5).contains(&self.rating) {
      return Err(Error::InvalidRating(self.rating));
    }
    if self.reviewer_id == self.reviewee_id {
      return Err(Error::SelfReview);
    }
    Ok(())
  }
}

/// A review joined with its author's profile, as the public listing shows it.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewWithAuthor {
  pub review:   Review,
  pub reviewer: Profile,
}

/// A moderation-queue entry: the unapproved review plus both parties.
#[derive(Debug, Clone, Serialize)]
pub struct PendingReview {
  pub review:   Review,
  pub reviewer: Profile,
  pub reviewee: Profile,
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// Mean rating and count over the approved ratings of one profile.
/// Returns `(0.0, 0)` for an empty slice.
pub fn aggregate(ratings: &[u8]) -> (f64, u32) {
  if ratings.is_empty() {
    return (0.0, 0);
  }
  let sum: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
  (f64::from(sum) / ratings.len() as f64, ratings.len() as u32)
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  fn review(rating: u8) -> NewReview {
    NewReview {
      reviewer_id: Uuid::new_v4(),
      reviewee_id: Uuid::new_v4(),
      rating,
      comment: String::new(),
    }
  }

  #[test]
  fn rating_bounds_enforced() {
    assert!(matches!(review(0).validate(), Err(Error::InvalidRating(0))));
    assert!(matches!(review(6).validate(), Err(Error::InvalidRating(6))));
    assert!(review(1).validate().is_ok());
    assert!(review(5).validate().is_ok());
  }

  #[test]
  fn self_review_rejected() {
    let id = Uuid::new_v4();
    let r = NewReview {
      reviewer_id: id,
      reviewee_id: id,
      rating: 4,
      comment: String::new(),
    };
    assert!(matches!(r.validate(), Err(Error::SelfReview)));
  }

  #[test]
  fn aggregate_of_empty_is_zero() {
    assert_eq!(aggregate(&[]), (0.0, 0));
  }

  #[test]
  fn aggregate_means_over_approved_ratings() {
    let (mean, count) = aggregate(&[5, 4, 3]);
    assert_eq!(count, 3);
    assert!((mean - 4.0).abs() < f64::EPSILON);
  }
}
