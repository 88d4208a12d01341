//! SQL schema for the Crewhub SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    user_id       TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT,            -- argon2 PHC string; NULL for OAuth accounts
    created_at    TEXT NOT NULL    -- ISO 8601 UTC
);

CREATE TABLE IF NOT EXISTS sessions (
    token_digest TEXT PRIMARY KEY, -- SHA-256 hex of the bearer token
    user_id      TEXT NOT NULL REFERENCES accounts(user_id) ON DELETE CASCADE,
    created_at   TEXT NOT NULL,
    expires_at   TEXT NOT NULL
);

-- Parked state between the OAuth redirect and its callback; consumed once.
CREATE TABLE IF NOT EXISTS oauth_states (
    state         TEXT PRIMARY KEY,
    pkce_verifier TEXT NOT NULL,
    return_url    TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    user_id         TEXT PRIMARY KEY REFERENCES accounts(user_id),
    email           TEXT NOT NULL,
    name            TEXT NOT NULL,
    role            TEXT NOT NULL,             -- 'YouTuber' | 'Editor' | 'Designer' | 'Other'
    skills          TEXT NOT NULL DEFAULT '[]', -- JSON array of strings
    bio             TEXT NOT NULL DEFAULT '',
    avatar_path     TEXT,                      -- blob-store key
    portfolio_links TEXT NOT NULL DEFAULT '{}', -- JSON object, label -> url
    availability    TEXT NOT NULL DEFAULT 'available',
    is_premium      INTEGER NOT NULL DEFAULT 0,
    is_featured     INTEGER NOT NULL DEFAULT 0,
    is_verified     INTEGER NOT NULL DEFAULT 0,
    rating          REAL    NOT NULL DEFAULT 0, -- aggregate over approved reviews
    review_count    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    message_id  TEXT PRIMARY KEY,
    sender_id   TEXT NOT NULL REFERENCES profiles(user_id),
    receiver_id TEXT NOT NULL REFERENCES profiles(user_id),
    content     TEXT NOT NULL,
    file_path   TEXT,                -- blob-store key of an attachment
    is_read     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

-- One review per (reviewer, reviewee) pair.
CREATE TABLE IF NOT EXISTS reviews (
    review_id   TEXT PRIMARY KEY,
    reviewer_id TEXT NOT NULL REFERENCES profiles(user_id),
    reviewee_id TEXT NOT NULL REFERENCES profiles(user_id),
    rating      INTEGER NOT NULL,    -- 1..=5
    comment     TEXT NOT NULL DEFAULT '',
    is_approved INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    UNIQUE (reviewer_id, reviewee_id),
    CHECK  (reviewer_id != reviewee_id)
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id          TEXT PRIMARY KEY,
    user_id                  TEXT NOT NULL REFERENCES accounts(user_id),
    provider_customer_id     TEXT NOT NULL,
    provider_subscription_id TEXT NOT NULL UNIQUE,
    status                   TEXT NOT NULL,  -- 'active' | 'canceled'
    plan                     TEXT NOT NULL,  -- 'premium'
    created_at               TEXT NOT NULL
);

-- Processed webhook event ids; replayed ids are acknowledged without effect.
CREATE TABLE IF NOT EXISTS billing_events (
    event_id     TEXT PRIMARY KEY,
    processed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_sender_idx   ON messages(sender_id);
CREATE INDEX IF NOT EXISTS messages_receiver_idx ON messages(receiver_id);
CREATE INDEX IF NOT EXISTS messages_created_idx  ON messages(created_at);
CREATE INDEX IF NOT EXISTS reviews_reviewee_idx  ON reviews(reviewee_id);
CREATE INDEX IF NOT EXISTS sessions_user_idx     ON sessions(user_id);
CREATE INDEX IF NOT EXISTS subscriptions_user_idx ON subscriptions(user_id);

PRAGMA user_version = 1;
";
