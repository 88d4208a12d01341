//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use crewhub_core::{
  account::{NewAccount, UserAccount},
  billing::{BillingEvent, EventOutcome, SubscriptionStatus},
  error::AsCoreError as _,
  message::{FREE_MESSAGE_QUOTA, NewMessage},
  profile::{Availability, Profile, ProfilePatch, Role, parse_skills},
  review::NewReview,
  store::{MarketStore, ProfileQuery, ProfileSort},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn user(s: &SqliteStore, email: &str, name: &str) -> (UserAccount, Profile) {
  s.create_account(NewAccount {
    email:         email.into(),
    password_hash: Some("$argon2id$stub".into()),
    name:          name.into(),
    role:          Role::Editor,
  })
  .await
  .unwrap()
}

fn message(sender: Uuid, receiver: Uuid, content: &str) -> NewMessage {
  NewMessage {
    sender_id:   sender,
    receiver_id: receiver,
    content:     content.into(),
    file_path:   None,
  }
}

fn review(reviewer: Uuid, reviewee: Uuid, rating: u8) -> NewReview {
  NewReview {
    reviewer_id: reviewer,
    reviewee_id: reviewee,
    rating,
    comment: "solid work".into(),
  }
}

fn checkout(user_id: Uuid, sub: &str) -> BillingEvent {
  BillingEvent::CheckoutCompleted {
    user_id,
    provider_customer_id:     "cus_123".into(),
    provider_subscription_id: sub.into(),
  }
}

fn is_core(err: &Error, check: impl Fn(&crewhub_core::Error) -> bool) -> bool {
  err.as_core().is_some_and(check)
}

// ─── Accounts & sessions ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_account_creates_profile_too() {
  let s = store().await;
  let (account, profile) = user(&s, "alice@example.com", "Alice").await;

  assert_eq!(account.user_id, profile.user_id);
  assert_eq!(profile.role, Role::Editor);
  assert!(!profile.is_premium);

  let fetched = s.get_profile(account.user_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Alice");
  assert_eq!(fetched.email, "alice@example.com");
}

#[tokio::test]
async fn duplicate_email_rejected() {
  let s = store().await;
  user(&s, "alice@example.com", "Alice").await;

  let err = s
    .create_account(NewAccount {
      email:         "alice@example.com".into(),
      password_hash: None,
      name:          "Imposter".into(),
      role:          Role::Other,
    })
    .await
    .unwrap_err();

  assert!(is_core(&err, |e| matches!(e, crewhub_core::Error::EmailTaken(_))));
}

#[tokio::test]
async fn session_round_trip() {
  let s = store().await;
  let (account, _) = user(&s, "alice@example.com", "Alice").await;

  let expires = Utc::now() + Duration::hours(1);
  s.create_session(account.user_id, "digest-1".into(), expires)
    .await
    .unwrap();

  let resolved = s.session_account("digest-1".into()).await.unwrap();
  assert_eq!(resolved.unwrap().user_id, account.user_id);

  assert!(s.session_account("digest-2".into()).await.unwrap().is_none());

  s.delete_session("digest-1".into()).await.unwrap();
  assert!(s.session_account("digest-1".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_session_does_not_resolve() {
  let s = store().await;
  let (account, _) = user(&s, "alice@example.com", "Alice").await;

  let expired = Utc::now() - Duration::minutes(1);
  s.create_session(account.user_id, "digest-old".into(), expired)
    .await
    .unwrap();

  assert!(s.session_account("digest-old".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn oauth_state_consumed_once() {
  let s = store().await;
  s.put_oauth_state(crewhub_core::account::OAuthState {
    state:         "csrf-abc".into(),
    pkce_verifier: "verifier".into(),
    return_url:    Some("/discover".into()),
    created_at:    Utc::now(),
  })
  .await
  .unwrap();

  let taken = s.take_oauth_state("csrf-abc".into()).await.unwrap().unwrap();
  assert_eq!(taken.pkce_verifier, "verifier");
  assert_eq!(taken.return_url.as_deref(), Some("/discover"));

  assert!(s.take_oauth_state("csrf-abc".into()).await.unwrap().is_none());
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_profile_lazily_creates_from_account() {
  let s = store().await;
  let (account, _) = user(&s, "alice@example.com", "Alice").await;

  // Simulate an account whose profile never got created.
  s.conn
    .call(|conn| {
      conn.execute("DELETE FROM profiles", [])?;
      Ok(())
    })
    .await
    .unwrap();
  assert!(s.get_profile(account.user_id).await.unwrap().is_none());

  let profile = s.ensure_profile(account.user_id).await.unwrap();
  assert_eq!(profile.user_id, account.user_id);
  // Default display name falls back to the email's local part.
  assert_eq!(profile.name, "alice");
  assert_eq!(profile.role, Role::Other);

  // A second call returns the stored row instead of recreating it.
  let again = s.ensure_profile(account.user_id).await.unwrap();
  assert_eq!(again.name, "alice");
}

#[tokio::test]
async fn update_profile_merges_patch() {
  let s = store().await;
  let (account, _) = user(&s, "alice@example.com", "Alice").await;

  let skills = parse_skills("Video Editing, Motion Graphics ,, Color Grading");
  let updated = s
    .update_profile(account.user_id, ProfilePatch {
      skills: Some(skills),
      bio: Some("cutting since 2019".into()),
      availability: Some(Availability::Busy),
      ..Default::default()
    })
    .await
    .unwrap();

  assert_eq!(updated.skills, vec![
    "Video Editing",
    "Motion Graphics",
    "Color Grading"
  ]);
  assert_eq!(updated.name, "Alice"); // untouched

  let fetched = s.get_profile(account.user_id).await.unwrap().unwrap();
  assert_eq!(fetched.bio, "cutting since 2019");
  assert_eq!(fetched.availability, Availability::Busy);
  assert_eq!(fetched.skills, updated.skills);
}

#[tokio::test]
async fn list_profiles_filters_and_sorts() {
  let s = store().await;
  let (a, _) = user(&s, "a@example.com", "Ava Editor").await;
  let (b, _) = user(&s, "b@example.com", "Ben Designer").await;
  user(&s, "c@example.com", "Cal Other").await;

  s.update_profile(b.user_id, ProfilePatch {
    role: Some(Role::Designer),
    skills: Some(vec!["Logo Design".into()]),
    ..Default::default()
  })
  .await
  .unwrap();

  // Role filter.
  let designers = s
    .list_profiles(&ProfileQuery {
      role: Some(Role::Designer),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(designers.len(), 1);
  assert_eq!(designers[0].user_id, b.user_id);

  // Text filter hits skills too.
  let found = s
    .list_profiles(&ProfileQuery {
      text: Some("logo".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].user_id, b.user_id);

  // Featured profiles order first regardless of sort key.
  s.set_featured(a.user_id, true).await.unwrap();
  let all = s
    .list_profiles(&ProfileQuery {
      sort: ProfileSort::Newest,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(all[0].user_id, a.user_id);
}

#[tokio::test]
async fn set_avatar_returns_previous_key() {
  let s = store().await;
  let (account, _) = user(&s, "alice@example.com", "Alice").await;

  let old = s
    .set_avatar(account.user_id, Some("avatars/alice.png".into()))
    .await
    .unwrap();
  assert!(old.is_none());

  let old = s
    .set_avatar(account.user_id, Some("avatars/alice.jpg".into()))
    .await
    .unwrap();
  assert_eq!(old.as_deref(), Some("avatars/alice.png"));
}

// ─── Message quota ───────────────────────────────────────────────────────────

#[tokio::test]
async fn free_sender_blocked_at_quota() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;

  for i in 0..FREE_MESSAGE_QUOTA {
    s.send_message(message(alice.user_id, bob.user_id, &format!("hi {i}")))
      .await
      .unwrap();
  }
  assert_eq!(s.sent_message_count(alice.user_id).await.unwrap(), 10);

  let err = s
    .send_message(message(alice.user_id, bob.user_id, "one too many"))
    .await
    .unwrap_err();
  assert!(is_core(&err, |e| {
    matches!(e, crewhub_core::Error::MessageQuotaExceeded { limit: 10 })
  }));
}

#[tokio::test]
async fn premium_sender_never_blocked() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;

  s.apply_billing_event("evt_1".into(), checkout(alice.user_id, "sub_1"))
    .await
    .unwrap();

  for i in 0..(FREE_MESSAGE_QUOTA + 5) {
    s.send_message(message(alice.user_id, bob.user_id, &format!("hi {i}")))
      .await
      .unwrap();
  }
  assert_eq!(
    s.sent_message_count(alice.user_id).await.unwrap(),
    FREE_MESSAGE_QUOTA + 5
  );
}

// ─── Conversations & threads ─────────────────────────────────────────────────

#[tokio::test]
async fn conversations_derive_partners_and_unread() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;
  let (cara, _) = user(&s, "cara@example.com", "Cara").await;

  s.send_message(message(alice.user_id, bob.user_id, "hey bob"))
    .await
    .unwrap();
  s.send_message(message(cara.user_id, alice.user_id, "hey alice"))
    .await
    .unwrap();
  s.send_message(message(cara.user_id, alice.user_id, "you there?"))
    .await
    .unwrap();

  let convs = s.conversations(alice.user_id).await.unwrap();
  assert_eq!(convs.len(), 2);

  let from_cara = convs
    .iter()
    .find(|c| c.partner.user_id == cara.user_id)
    .unwrap();
  assert_eq!(from_cara.unread, 2);

  let with_bob = convs
    .iter()
    .find(|c| c.partner.user_id == bob.user_id)
    .unwrap();
  assert_eq!(with_bob.unread, 0);
}

#[tokio::test]
async fn thread_orders_ascending_and_mark_read_flips() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;

  s.send_message(message(alice.user_id, bob.user_id, "first"))
    .await
    .unwrap();
  s.send_message(message(bob.user_id, alice.user_id, "second"))
    .await
    .unwrap();

  let thread = s.thread(alice.user_id, bob.user_id).await.unwrap();
  assert_eq!(thread.len(), 2);
  assert_eq!(thread[0].content, "first");
  assert_eq!(thread[1].content, "second");
  assert!(!thread[1].is_read);

  let flipped = s.mark_read(alice.user_id, bob.user_id).await.unwrap();
  assert_eq!(flipped, 1);

  let thread = s.thread(alice.user_id, bob.user_id).await.unwrap();
  assert!(thread[1].is_read);
  // Alice's own message is untouched.
  assert!(!thread[0].is_read);
}

// ─── Reviews & moderation ────────────────────────────────────────────────────

#[tokio::test]
async fn unapproved_review_invisible_until_approved() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;

  let r = s
    .submit_review(review(alice.user_id, bob.user_id, 5))
    .await
    .unwrap();
  assert!(!r.is_approved);

  assert!(s.approved_reviews(bob.user_id).await.unwrap().is_empty());
  let profile = s.get_profile(bob.user_id).await.unwrap().unwrap();
  assert_eq!(profile.review_count, 0);

  s.approve_review(r.review_id).await.unwrap();

  let listed = s.approved_reviews(bob.user_id).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].review.review_id, r.review_id);
  assert_eq!(listed[0].reviewer.user_id, alice.user_id);

  let profile = s.get_profile(bob.user_id).await.unwrap().unwrap();
  assert_eq!(profile.review_count, 1);
  assert!((profile.rating - 5.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn second_review_for_same_pair_rejected() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;

  s.submit_review(review(alice.user_id, bob.user_id, 4))
    .await
    .unwrap();

  let err = s
    .submit_review(review(alice.user_id, bob.user_id, 1))
    .await
    .unwrap_err();
  assert!(is_core(&err, |e| {
    matches!(e, crewhub_core::Error::DuplicateReview(_, _))
  }));

  // The other direction is a separate pair and is fine.
  s.submit_review(review(bob.user_id, alice.user_id, 5))
    .await
    .unwrap();
}

#[tokio::test]
async fn deleting_approved_review_recomputes_aggregate() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;
  let (cara, _) = user(&s, "cara@example.com", "Cara").await;

  let r1 = s
    .submit_review(review(alice.user_id, bob.user_id, 5))
    .await
    .unwrap();
  let r2 = s
    .submit_review(review(cara.user_id, bob.user_id, 3))
    .await
    .unwrap();
  s.approve_review(r1.review_id).await.unwrap();
  s.approve_review(r2.review_id).await.unwrap();

  let profile = s.get_profile(bob.user_id).await.unwrap().unwrap();
  assert_eq!(profile.review_count, 2);
  assert!((profile.rating - 4.0).abs() < f64::EPSILON);

  s.delete_review(r1.review_id).await.unwrap();
  let profile = s.get_profile(bob.user_id).await.unwrap().unwrap();
  assert_eq!(profile.review_count, 1);
  assert!((profile.rating - 3.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn pending_queue_oldest_first() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;
  let (cara, _) = user(&s, "cara@example.com", "Cara").await;

  let first = s
    .submit_review(review(alice.user_id, bob.user_id, 4))
    .await
    .unwrap();
  let second = s
    .submit_review(review(cara.user_id, bob.user_id, 2))
    .await
    .unwrap();

  let pending = s.pending_reviews().await.unwrap();
  assert_eq!(pending.len(), 2);
  assert_eq!(pending[0].review.review_id, first.review_id);
  assert_eq!(pending[1].review.review_id, second.review_id);
  assert_eq!(pending[0].reviewee.user_id, bob.user_id);
}

// ─── Cascade deletion ────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_user_cascades_everywhere() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;

  s.send_message(message(alice.user_id, bob.user_id, "hi"))
    .await
    .unwrap();
  s.send_message(message(bob.user_id, alice.user_id, "hi back"))
    .await
    .unwrap();

  let r = s
    .submit_review(review(bob.user_id, alice.user_id, 1))
    .await
    .unwrap();
  s.approve_review(r.review_id).await.unwrap();

  let authored = s
    .submit_review(review(alice.user_id, bob.user_id, 5))
    .await
    .unwrap();
  s.approve_review(authored.review_id).await.unwrap();

  s.apply_billing_event("evt_del".into(), checkout(alice.user_id, "sub_del"))
    .await
    .unwrap();

  s.delete_user(alice.user_id).await.unwrap();

  assert!(s.get_profile(alice.user_id).await.unwrap().is_none());
  assert!(s.account_by_id(alice.user_id).await.unwrap().is_none());
  assert!(s.conversations(bob.user_id).await.unwrap().is_empty());
  assert!(s.thread(bob.user_id, alice.user_id).await.unwrap().is_empty());
  assert!(s.approved_reviews(bob.user_id).await.unwrap().is_empty());

  // Bob's aggregate no longer counts Alice's deleted review.
  let bob_profile = s.get_profile(bob.user_id).await.unwrap().unwrap();
  assert_eq!(bob_profile.review_count, 0);
  assert!((bob_profile.rating - 0.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn delete_unknown_user_errors() {
  let s = store().await;
  let err = s.delete_user(Uuid::new_v4()).await.unwrap_err();
  assert!(is_core(&err, |e| {
    matches!(e, crewhub_core::Error::AccountNotFound(_))
  }));
}

// ─── Billing events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_completed_activates_premium() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;

  let outcome = s
    .apply_billing_event("evt_1".into(), checkout(alice.user_id, "sub_1"))
    .await
    .unwrap();
  assert_eq!(outcome, EventOutcome::Applied);

  let sub = s
    .subscription_for_user(alice.user_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Active);
  assert_eq!(sub.provider_subscription_id, "sub_1");

  let profile = s.get_profile(alice.user_id).await.unwrap().unwrap();
  assert!(profile.is_premium);
}

#[tokio::test]
async fn subscription_deleted_cancels_and_clears_flags() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;

  s.apply_billing_event("evt_1".into(), checkout(alice.user_id, "sub_1"))
    .await
    .unwrap();
  s.set_featured(alice.user_id, true).await.unwrap();

  let outcome = s
    .apply_billing_event(
      "evt_2".into(),
      BillingEvent::SubscriptionDeleted {
        provider_subscription_id: "sub_1".into(),
      },
    )
    .await
    .unwrap();
  assert_eq!(outcome, EventOutcome::Applied);

  let sub = s
    .subscription_for_user(alice.user_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Canceled);

  let profile = s.get_profile(alice.user_id).await.unwrap().unwrap();
  assert!(!profile.is_premium);
  assert!(!profile.is_featured);
}

#[tokio::test]
async fn replayed_event_is_a_no_op() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;

  s.apply_billing_event("evt_1".into(), checkout(alice.user_id, "sub_1"))
    .await
    .unwrap();
  s.apply_billing_event(
    "evt_2".into(),
    BillingEvent::SubscriptionDeleted {
      provider_subscription_id: "sub_1".into(),
    },
  )
  .await
  .unwrap();

  // Replaying the checkout must not resurrect the premium flag.
  let outcome = s
    .apply_billing_event("evt_1".into(), checkout(alice.user_id, "sub_1"))
    .await
    .unwrap();
  assert_eq!(outcome, EventOutcome::AlreadyProcessed);

  let profile = s.get_profile(alice.user_id).await.unwrap().unwrap();
  assert!(!profile.is_premium);
}

#[tokio::test]
async fn unknown_subscription_is_acknowledged_without_writes() {
  let s = store().await;

  let outcome = s
    .apply_billing_event(
      "evt_x".into(),
      BillingEvent::SubscriptionDeleted {
        provider_subscription_id: "sub_missing".into(),
      },
    )
    .await
    .unwrap();
  assert_eq!(outcome, EventOutcome::NoMatch);
}

// ─── Admin stats ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_stats_count_flags_and_subscriptions() {
  let s = store().await;
  let (alice, _) = user(&s, "alice@example.com", "Alice").await;
  let (bob, _) = user(&s, "bob@example.com", "Bob").await;
  user(&s, "cara@example.com", "Cara").await;

  s.apply_billing_event("evt_1".into(), checkout(alice.user_id, "sub_1"))
    .await
    .unwrap();
  s.set_featured(bob.user_id, true).await.unwrap();

  let stats = s.admin_stats().await.unwrap();
  assert_eq!(stats.total_users, 3);
  assert_eq!(stats.premium_users, 1);
  assert_eq!(stats.featured_users, 1);
  assert_eq!(stats.active_subscriptions, 1);
}
