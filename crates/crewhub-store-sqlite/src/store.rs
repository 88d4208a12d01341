//! [`SqliteStore`] — the SQLite implementation of [`MarketStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crewhub_core::{
  account::{NewAccount, OAuthState, Session, UserAccount},
  billing::{BillingEvent, EventOutcome, Subscription},
  message::{self, Conversation, Message, NewMessage},
  profile::{Profile, ProfilePatch},
  review::{NewReview, PendingReview, Review, ReviewWithAuthor},
  store::{AdminStats, MarketStore, ProfileQuery, ProfileSort},
};

use crate::{
  Error, Result,
  encode::{
    RawAccount, RawMessage, RawProfile, RawReview, RawSubscription,
    encode_availability, encode_dt, encode_links, encode_role, encode_skills,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Crewhub marketplace store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_profile(&self, id_str: String) -> Result<Option<Profile>> {
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM profiles WHERE user_id = ?1",
                RawProfile::COLUMNS
              ),
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }
}

// ─── Closure-side helpers ────────────────────────────────────────────────────

/// Recompute a profile's aggregate rating and review count from its approved
/// reviews. Runs inside the caller's transaction.
fn recompute_aggregate(
  conn: &rusqlite::Connection,
  reviewee_id: &str,
) -> rusqlite::Result<()> {
  let mut stmt = conn
    .prepare("SELECT rating FROM reviews WHERE reviewee_id = ?1 AND is_approved = 1")?;
  let ratings: Vec<u8> = stmt
    .query_map(rusqlite::params![reviewee_id], |r| r.get::<_, i64>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(|r| r as u8)
    .collect();

  let (mean, count) = crewhub_core::review::aggregate(&ratings);
  conn.execute(
    "UPDATE profiles SET rating = ?1, review_count = ?2 WHERE user_id = ?3",
    rusqlite::params![mean, count, reviewee_id],
  )?;
  Ok(())
}

/// Outcome smuggled out of the `send_message` transaction closure.
enum SendOutcome {
  Sent,
  QuotaExceeded,
  SenderMissing,
}

/// Outcome smuggled out of the `submit_review` transaction closure.
enum ReviewOutcome {
  Accepted,
  Duplicate,
  RevieweeMissing,
}

// ─── MarketStore impl ────────────────────────────────────────────────────────

impl MarketStore for SqliteStore {
  type Error = Error;

  // ── Accounts & sessions ───────────────────────────────────────────────────

  async fn create_account(&self, input: NewAccount) -> Result<(UserAccount, Profile)> {
    let now = Utc::now();
    let account = UserAccount {
      user_id:       Uuid::new_v4(),
      email:         input.email,
      password_hash: input.password_hash,
      created_at:    now,
    };
    let profile = Profile {
      user_id:         account.user_id,
      email:           account.email.clone(),
      name:            input.name,
      role:            input.role,
      skills:          Vec::new(),
      bio:             String::new(),
      avatar_path:     None,
      portfolio_links: Default::default(),
      availability:    Default::default(),
      is_premium:      false,
      is_featured:     false,
      is_verified:     false,
      rating:          0.0,
      review_count:    0,
      created_at:      now,
    };

    let id_str     = encode_uuid(account.user_id);
    let email      = account.email.clone();
    let hash       = account.password_hash.clone();
    let at_str     = encode_dt(now);
    let name       = profile.name.clone();
    let role_str   = encode_role(profile.role).to_owned();
    let skills_str = encode_skills(&profile.skills)?;
    let links_str  = encode_links(&profile.portfolio_links)?;
    let avail_str  = encode_availability(profile.availability).to_owned();

    let created: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken: bool = tx
          .query_row(
            "SELECT 1 FROM accounts WHERE email = ?1",
            rusqlite::params![email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO accounts (user_id, email, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, email, hash, at_str],
        )?;
        tx.execute(
          "INSERT INTO profiles (user_id, email, name, role, skills, bio,
             avatar_path, portfolio_links, availability, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, '', NULL, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, email, name, role_str, skills_str, links_str, avail_str,
            at_str
          ],
        )?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !created {
      return Err(Error::Core(crewhub_core::Error::EmailTaken(account.email)));
    }
    Ok((account, profile))
  }

  async fn account_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
    let email = email.to_owned();
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM accounts WHERE email = ?1", RawAccount::COLUMNS),
              rusqlite::params![email],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn account_by_id(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
    let id_str = encode_uuid(user_id);
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM accounts WHERE user_id = ?1", RawAccount::COLUMNS),
              rusqlite::params![id_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn create_session(
    &self,
    user_id: Uuid,
    token_digest: String,
    expires_at: DateTime<Utc>,
  ) -> Result<Session> {
    let session = Session {
      token_digest,
      user_id,
      created_at: Utc::now(),
      expires_at,
    };

    let digest  = session.token_digest.clone();
    let id_str  = encode_uuid(user_id);
    let at_str  = encode_dt(session.created_at);
    let exp_str = encode_dt(session.expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_digest, user_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![digest, id_str, at_str, exp_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(session)
  }

  async fn session_account(&self, token_digest: String) -> Result<Option<UserAccount>> {
    let now_str = encode_dt(Utc::now());
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT a.user_id, a.email, a.password_hash, a.created_at
               FROM sessions s
               JOIN accounts a ON a.user_id = s.user_id
               WHERE s.token_digest = ?1 AND s.expires_at > ?2",
              rusqlite::params![token_digest, now_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn delete_session(&self, token_digest: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM sessions WHERE token_digest = ?1",
          rusqlite::params![token_digest],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn put_oauth_state(&self, state: OAuthState) -> Result<()> {
    let at_str = encode_dt(state.created_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO oauth_states (state, pkce_verifier, return_url, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![state.state, state.pkce_verifier, state.return_url, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn take_oauth_state(&self, state: String) -> Result<Option<OAuthState>> {
    let row: Option<(String, String, Option<String>, String)> = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(
            "SELECT state, pkce_verifier, return_url, created_at
             FROM oauth_states WHERE state = ?1",
            rusqlite::params![state],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
          )
          .optional()?;
        if row.is_some() {
          conn.execute(
            "DELETE FROM oauth_states WHERE state = ?1",
            rusqlite::params![state],
          )?;
        }
        Ok(row)
      })
      .await?;

    row
      .map(|(state, pkce_verifier, return_url, at)| {
        Ok(OAuthState {
          state,
          pkce_verifier,
          return_url,
          created_at: crate::encode::decode_dt(&at)?,
        })
      })
      .transpose()
  }

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
    self.fetch_profile(encode_uuid(user_id)).await
  }

  async fn ensure_profile(&self, user_id: Uuid) -> Result<Profile> {
    if let Some(profile) = self.get_profile(user_id).await? {
      return Ok(profile);
    }

    let account = self
      .account_by_id(user_id)
      .await?
      .ok_or(Error::Core(crewhub_core::Error::AccountNotFound(user_id)))?;

    // Default display name: the local part of the email address.
    let name = account
      .email
      .split('@')
      .next()
      .unwrap_or(account.email.as_str())
      .to_owned();

    let profile = Profile {
      user_id,
      email: account.email,
      name,
      role: Default::default(),
      skills: Vec::new(),
      bio: String::new(),
      avatar_path: None,
      portfolio_links: Default::default(),
      availability: Default::default(),
      is_premium: false,
      is_featured: false,
      is_verified: false,
      rating: 0.0,
      review_count: 0,
      created_at: Utc::now(),
    };

    let id_str     = encode_uuid(user_id);
    let email      = profile.email.clone();
    let name       = profile.name.clone();
    let role_str   = encode_role(profile.role).to_owned();
    let skills_str = encode_skills(&profile.skills)?;
    let links_str  = encode_links(&profile.portfolio_links)?;
    let avail_str  = encode_availability(profile.availability).to_owned();
    let at_str     = encode_dt(profile.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO profiles (user_id, email, name, role, skills,
             bio, avatar_path, portfolio_links, availability, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, '', NULL, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, email, name, role_str, skills_str, links_str, avail_str,
            at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(profile)
  }

  async fn list_profiles(&self, query: &ProfileQuery) -> Result<Vec<Profile>> {
    let text_pattern = query
      .text
      .as_deref()
      .map(|t| format!("%{}%", t.to_lowercase()));
    let role_str   = query.role.map(encode_role).map(str::to_owned);
    let sort       = query.sort;
    let limit_val  = query.limit.unwrap_or(100) as i64;
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawProfile> = self
      .conn
      .call(move |conn| {
        let mut conds: Vec<&'static str> = vec![];
        if text_pattern.is_some() {
          conds.push(
            "(LOWER(name) LIKE ?1 OR LOWER(bio) LIKE ?1 OR LOWER(skills) LIKE ?1)",
          );
        }
        if role_str.is_some() {
          conds.push("role = ?2");
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        // Featured profiles always sort first, then the requested key.
        let order_key = match sort {
          ProfileSort::Rating => "rating DESC",
          ProfileSort::Newest => "created_at DESC",
          ProfileSort::Reviews => "review_count DESC",
        };

        let sql = format!(
          "SELECT {} FROM profiles
           {where_clause}
           ORDER BY is_featured DESC, {order_key}
           LIMIT ?3 OFFSET ?4",
          RawProfile::COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              text_pattern.as_deref(),
              role_str.as_deref(),
              limit_val,
              offset_val,
            ],
            RawProfile::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProfile::into_profile).collect()
  }

  async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> Result<Profile> {
    let mut profile = self
      .get_profile(user_id)
      .await?
      .ok_or(Error::Core(crewhub_core::Error::ProfileNotFound(user_id)))?;

    // Last write wins; no concurrency token.
    if let Some(name) = patch.name {
      profile.name = name;
    }
    if let Some(role) = patch.role {
      profile.role = role;
    }
    if let Some(skills) = patch.skills {
      profile.skills = skills;
    }
    if let Some(bio) = patch.bio {
      profile.bio = bio;
    }
    if let Some(links) = patch.portfolio_links {
      profile.portfolio_links = links;
    }
    if let Some(availability) = patch.availability {
      profile.availability = availability;
    }

    let id_str     = encode_uuid(user_id);
    let name       = profile.name.clone();
    let role_str   = encode_role(profile.role).to_owned();
    let skills_str = encode_skills(&profile.skills)?;
    let bio        = profile.bio.clone();
    let links_str  = encode_links(&profile.portfolio_links)?;
    let avail_str  = encode_availability(profile.availability).to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE profiles SET name = ?1, role = ?2, skills = ?3, bio = ?4,
             portfolio_links = ?5, availability = ?6
           WHERE user_id = ?7",
          rusqlite::params![
            name, role_str, skills_str, bio, links_str, avail_str, id_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(profile)
  }

  async fn set_avatar(
    &self,
    user_id: Uuid,
    avatar_path: Option<String>,
  ) -> Result<Option<String>> {
    let id_str = encode_uuid(user_id);

    let previous: Option<Option<String>> = self
      .conn
      .call(move |conn| {
        let old: Option<Option<String>> = conn
          .query_row(
            "SELECT avatar_path FROM profiles WHERE user_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        if old.is_some() {
          conn.execute(
            "UPDATE profiles SET avatar_path = ?1 WHERE user_id = ?2",
            rusqlite::params![avatar_path, id_str],
          )?;
        }
        Ok(old)
      })
      .await?;

    match previous {
      None => Err(Error::Core(crewhub_core::Error::ProfileNotFound(user_id))),
      Some(old) => Ok(old),
    }
  }

  async fn set_verified(&self, user_id: Uuid, verified: bool) -> Result<()> {
    let id_str = encode_uuid(user_id);
    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET is_verified = ?1 WHERE user_id = ?2",
          rusqlite::params![verified, id_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::Core(crewhub_core::Error::ProfileNotFound(user_id)));
    }
    Ok(())
  }

  async fn set_featured(&self, user_id: Uuid, featured: bool) -> Result<()> {
    let id_str = encode_uuid(user_id);
    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET is_featured = ?1 WHERE user_id = ?2",
          rusqlite::params![featured, id_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::Core(crewhub_core::Error::ProfileNotFound(user_id)));
    }
    Ok(())
  }

  async fn delete_user(&self, user_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(user_id);

    let found: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM accounts WHERE user_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }

        // Profiles this user reviewed keep existing; their aggregates must
        // be recomputed once the authored reviews are gone.
        let reviewees: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT DISTINCT reviewee_id FROM reviews WHERE reviewer_id = ?1",
          )?;
          stmt
            .query_map(rusqlite::params![id_str], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute(
          "DELETE FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM reviews WHERE reviewer_id = ?1 OR reviewee_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM subscriptions WHERE user_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM sessions WHERE user_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM profiles WHERE user_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM accounts WHERE user_id = ?1",
          rusqlite::params![id_str],
        )?;

        for reviewee in &reviewees {
          if reviewee != &id_str {
            recompute_aggregate(&tx, reviewee)?;
          }
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::Core(crewhub_core::Error::AccountNotFound(user_id)));
    }
    Ok(())
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn sent_message_count(&self, user_id: Uuid) -> Result<u32> {
    let id_str = encode_uuid(user_id);
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM messages WHERE sender_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count as u32)
  }

  async fn send_message(&self, input: NewMessage) -> Result<Message> {
    let msg = Message {
      message_id:  Uuid::new_v4(),
      sender_id:   input.sender_id,
      receiver_id: input.receiver_id,
      content:     input.content,
      file_path:   input.file_path,
      is_read:     false,
      created_at:  Utc::now(),
    };

    let msg_id_str   = encode_uuid(msg.message_id);
    let sender_str   = encode_uuid(msg.sender_id);
    let receiver_str = encode_uuid(msg.receiver_id);
    let content      = msg.content.clone();
    let file_path    = msg.file_path.clone();
    let at_str       = encode_dt(msg.created_at);

    let outcome: SendOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Quota gate lives here, not in the client: read the sender's
        // premium flag and prior sent count under the same transaction as
        // the insert.
        let premium: Option<bool> = tx
          .query_row(
            "SELECT is_premium FROM profiles WHERE user_id = ?1",
            rusqlite::params![sender_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(premium) = premium else {
          return Ok(SendOutcome::SenderMissing);
        };

        let sent: i64 = tx.query_row(
          "SELECT COUNT(*) FROM messages WHERE sender_id = ?1",
          rusqlite::params![sender_str],
          |r| r.get(0),
        )?;

        if !message::can_send(premium, sent as u32) {
          return Ok(SendOutcome::QuotaExceeded);
        }

        tx.execute(
          "INSERT INTO messages (message_id, sender_id, receiver_id, content,
             file_path, is_read, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
          rusqlite::params![
            msg_id_str, sender_str, receiver_str, content, file_path, at_str
          ],
        )?;

        tx.commit()?;
        Ok(SendOutcome::Sent)
      })
      .await?;

    match outcome {
      SendOutcome::Sent => Ok(msg),
      SendOutcome::QuotaExceeded => {
        Err(Error::Core(crewhub_core::Error::MessageQuotaExceeded {
          limit: message::FREE_MESSAGE_QUOTA,
        }))
      }
      SendOutcome::SenderMissing => {
        Err(Error::Core(crewhub_core::Error::ProfileNotFound(msg.sender_id)))
      }
    }
  }

  async fn conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
    let id_str = encode_uuid(user_id);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM messages
           WHERE sender_id = ?1 OR receiver_id = ?1
           ORDER BY created_at DESC",
          RawMessage::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Fold the flat table into distinct partners, most recent first.
    let mut order: Vec<Uuid> = Vec::new();
    let mut last_at: Vec<DateTime<Utc>> = Vec::new();
    let mut unread: Vec<u32> = Vec::new();

    for raw in raws {
      let msg = raw.into_message()?;
      let partner = if msg.sender_id == user_id {
        msg.receiver_id
      } else {
        msg.sender_id
      };

      let idx = match order.iter().position(|p| *p == partner) {
        Some(idx) => idx,
        None => {
          order.push(partner);
          last_at.push(msg.created_at);
          unread.push(0);
          order.len() - 1
        }
      };

      if msg.sender_id == partner && !msg.is_read {
        unread[idx] += 1;
      }
    }

    let mut conversations = Vec::with_capacity(order.len());
    for (idx, partner_id) in order.into_iter().enumerate() {
      // Partners whose profile was deleted drop out of the list.
      if let Some(partner) = self.get_profile(partner_id).await? {
        conversations.push(Conversation {
          partner,
          last_message_at: last_at[idx],
          unread: unread[idx],
        });
      }
    }

    Ok(conversations)
  }

  async fn thread(&self, user_id: Uuid, other_id: Uuid) -> Result<Vec<Message>> {
    let a = encode_uuid(user_id);
    let b = encode_uuid(other_id);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM messages
           WHERE (sender_id = ?1 AND receiver_id = ?2)
              OR (sender_id = ?2 AND receiver_id = ?1)
           ORDER BY created_at ASC",
          RawMessage::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![a, b], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn mark_read(&self, receiver_id: Uuid, sender_id: Uuid) -> Result<u64> {
    let receiver_str = encode_uuid(receiver_id);
    let sender_str   = encode_uuid(sender_id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE messages SET is_read = 1
           WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
          rusqlite::params![sender_str, receiver_str],
        )?)
      })
      .await?;

    Ok(changed as u64)
  }

  // ── Reviews ───────────────────────────────────────────────────────────────

  async fn submit_review(&self, input: NewReview) -> Result<Review> {
    input.validate().map_err(Error::Core)?;

    let review = Review {
      review_id:   Uuid::new_v4(),
      reviewer_id: input.reviewer_id,
      reviewee_id: input.reviewee_id,
      rating:      input.rating,
      comment:     input.comment,
      is_approved: false,
      created_at:  Utc::now(),
    };

    let review_id_str = encode_uuid(review.review_id);
    let reviewer_str  = encode_uuid(review.reviewer_id);
    let reviewee_str  = encode_uuid(review.reviewee_id);
    let rating        = i64::from(review.rating);
    let comment       = review.comment.clone();
    let at_str        = encode_dt(review.created_at);

    let outcome: ReviewOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let reviewee_exists: bool = tx
          .query_row(
            "SELECT 1 FROM profiles WHERE user_id = ?1",
            rusqlite::params![reviewee_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !reviewee_exists {
          return Ok(ReviewOutcome::RevieweeMissing);
        }

        let duplicate: bool = tx
          .query_row(
            "SELECT 1 FROM reviews WHERE reviewer_id = ?1 AND reviewee_id = ?2",
            rusqlite::params![reviewer_str, reviewee_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if duplicate {
          return Ok(ReviewOutcome::Duplicate);
        }

        tx.execute(
          "INSERT INTO reviews (review_id, reviewer_id, reviewee_id, rating,
             comment, is_approved, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
          rusqlite::params![
            review_id_str, reviewer_str, reviewee_str, rating, comment, at_str
          ],
        )?;

        tx.commit()?;
        Ok(ReviewOutcome::Accepted)
      })
      .await?;

    match outcome {
      ReviewOutcome::Accepted => Ok(review),
      ReviewOutcome::Duplicate => Err(Error::Core(
        crewhub_core::Error::DuplicateReview(review.reviewer_id, review.reviewee_id),
      )),
      ReviewOutcome::RevieweeMissing => Err(Error::Core(
        crewhub_core::Error::ProfileNotFound(review.reviewee_id),
      )),
    }
  }

  async fn approved_reviews(&self, reviewee_id: Uuid) -> Result<Vec<ReviewWithAuthor>> {
    let reviewee_str = encode_uuid(reviewee_id);

    let raws: Vec<RawReview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM reviews
           WHERE reviewee_id = ?1 AND is_approved = 1
           ORDER BY created_at DESC",
          RawReview::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![reviewee_str], RawReview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
      let review = raw.into_review()?;
      if let Some(reviewer) = self.get_profile(review.reviewer_id).await? {
        out.push(ReviewWithAuthor { review, reviewer });
      }
    }
    Ok(out)
  }

  async fn pending_reviews(&self) -> Result<Vec<PendingReview>> {
    let raws: Vec<RawReview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM reviews
           WHERE is_approved = 0
           ORDER BY created_at ASC",
          RawReview::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawReview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
      let review = raw.into_review()?;
      let reviewer = self.get_profile(review.reviewer_id).await?;
      let reviewee = self.get_profile(review.reviewee_id).await?;
      if let (Some(reviewer), Some(reviewee)) = (reviewer, reviewee) {
        out.push(PendingReview { review, reviewer, reviewee });
      }
    }
    Ok(out)
  }

  async fn approve_review(&self, review_id: Uuid) -> Result<()> {
    let review_id_str = encode_uuid(review_id);

    let found: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let reviewee: Option<String> = tx
          .query_row(
            "SELECT reviewee_id FROM reviews WHERE review_id = ?1",
            rusqlite::params![review_id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(reviewee) = reviewee else {
          return Ok(false);
        };

        tx.execute(
          "UPDATE reviews SET is_approved = 1 WHERE review_id = ?1",
          rusqlite::params![review_id_str],
        )?;
        recompute_aggregate(&tx, &reviewee)?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::Core(crewhub_core::Error::ReviewNotFound(review_id)));
    }
    Ok(())
  }

  async fn delete_review(&self, review_id: Uuid) -> Result<()> {
    let review_id_str = encode_uuid(review_id);

    let found: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let reviewee: Option<String> = tx
          .query_row(
            "SELECT reviewee_id FROM reviews WHERE review_id = ?1",
            rusqlite::params![review_id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(reviewee) = reviewee else {
          return Ok(false);
        };

        tx.execute(
          "DELETE FROM reviews WHERE review_id = ?1",
          rusqlite::params![review_id_str],
        )?;
        recompute_aggregate(&tx, &reviewee)?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::Core(crewhub_core::Error::ReviewNotFound(review_id)));
    }
    Ok(())
  }

  // ── Billing ───────────────────────────────────────────────────────────────

  async fn apply_billing_event(
    &self,
    event_id: String,
    event: BillingEvent,
  ) -> Result<EventOutcome> {
    let now_str    = encode_dt(Utc::now());
    let new_sub_id = encode_uuid(Uuid::new_v4());

    let outcome: EventOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let seen: bool = tx
          .query_row(
            "SELECT 1 FROM billing_events WHERE event_id = ?1",
            rusqlite::params![event_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if seen {
          return Ok(EventOutcome::AlreadyProcessed);
        }

        tx.execute(
          "INSERT INTO billing_events (event_id, processed_at) VALUES (?1, ?2)",
          rusqlite::params![event_id, now_str],
        )?;

        let outcome = match &event {
          BillingEvent::CheckoutCompleted {
            user_id,
            provider_customer_id,
            provider_subscription_id,
          } => {
            let user_str = encode_uuid(*user_id);

            let known: bool = tx
              .query_row(
                "SELECT 1 FROM accounts WHERE user_id = ?1",
                rusqlite::params![user_str],
                |_| Ok(true),
              )
              .optional()?
              .unwrap_or(false);
            if !known {
              EventOutcome::NoMatch
            } else {
              tx.execute(
                "INSERT INTO subscriptions (subscription_id, user_id,
                   provider_customer_id, provider_subscription_id, status,
                   plan, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', 'premium', ?5)
                 ON CONFLICT(provider_subscription_id) DO UPDATE SET
                   status = 'active', user_id = excluded.user_id,
                   provider_customer_id = excluded.provider_customer_id",
                rusqlite::params![
                  new_sub_id,
                  user_str,
                  provider_customer_id,
                  provider_subscription_id,
                  now_str
                ],
              )?;
              tx.execute(
                "UPDATE profiles SET is_premium = 1 WHERE user_id = ?1",
                rusqlite::params![user_str],
              )?;
              EventOutcome::Applied
            }
          }

          BillingEvent::SubscriptionDeleted { provider_subscription_id } => {
            let owner: Option<String> = tx
              .query_row(
                "SELECT user_id FROM subscriptions WHERE provider_subscription_id = ?1",
                rusqlite::params![provider_subscription_id],
                |r| r.get(0),
              )
              .optional()?;

            match owner {
              None => EventOutcome::NoMatch,
              Some(user_str) => {
                tx.execute(
                  "UPDATE subscriptions SET status = 'canceled'
                   WHERE provider_subscription_id = ?1",
                  rusqlite::params![provider_subscription_id],
                )?;
                tx.execute(
                  "UPDATE profiles SET is_premium = 0, is_featured = 0
                   WHERE user_id = ?1",
                  rusqlite::params![user_str],
                )?;
                EventOutcome::Applied
              }
            }
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }

  async fn subscription_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM subscriptions WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
                RawSubscription::COLUMNS
              ),
              rusqlite::params![id_str],
              RawSubscription::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  // ── Admin ─────────────────────────────────────────────────────────────────

  async fn admin_stats(&self) -> Result<AdminStats> {
    let stats: AdminStats = self
      .conn
      .call(|conn| {
        let total_users: i64 =
          conn.query_row("SELECT COUNT(*) FROM profiles", [], |r| r.get(0))?;
        let premium_users: i64 = conn.query_row(
          "SELECT COUNT(*) FROM profiles WHERE is_premium = 1",
          [],
          |r| r.get(0),
        )?;
        let featured_users: i64 = conn.query_row(
          "SELECT COUNT(*) FROM profiles WHERE is_featured = 1",
          [],
          |r| r.get(0),
        )?;
        let active_subscriptions: i64 = conn.query_row(
          "SELECT COUNT(*) FROM subscriptions WHERE status = 'active'",
          [],
          |r| r.get(0),
        )?;

        Ok(AdminStats {
          total_users:          total_users as u64,
          premium_users:        premium_users as u64,
          featured_users:       featured_users as u64,
          active_subscriptions: active_subscriptions as u64,
        })
      })
      .await?;

    Ok(stats)
  }
}
