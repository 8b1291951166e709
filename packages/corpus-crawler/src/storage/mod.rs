//! Durable corpus state.
//!
//! Reads go straight to a pooled SQLite handle; every mutation is funnelled
//! through one bounded queue and applied by a single writer connection.

mod store;
mod writer;

pub use store::{CorpusStore, PendingId};
pub use writer::{StoreWriter, WriterTask};

/// Idempotent schema for a corpus database.
///
/// Flags are INTEGER 0/1 defaulting to the unprocessed, unaccepted,
/// unprotected state. Handles compare case-insensitively.
pub(crate) const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id INTEGER PRIMARY KEY,
    handle TEXT NOT NULL COLLATE NOCASE UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    raw BLOB NOT NULL,
    protected INTEGER NOT NULL DEFAULT 0,
    message_watermark INTEGER NOT NULL DEFAULT 0,
    following_watermark INTEGER NOT NULL DEFAULT 0,
    follower_watermark INTEGER NOT NULL DEFAULT 0,
    last_looked_at INTEGER,
    processed INTEGER NOT NULL DEFAULT 0,
    accepted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_profiles_frontier ON profiles(processed, accepted);

CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES profiles(user_id),
    created_at INTEGER NOT NULL,
    lang TEXT,
    text TEXT NOT NULL,
    raw BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages(user_id);

CREATE TABLE IF NOT EXISTS pending_handles (
    handle TEXT PRIMARY KEY COLLATE NOCASE,
    processed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS pending_ids (
    user_id INTEGER PRIMARY KEY,
    processed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS following (
    user_id INTEGER NOT NULL REFERENCES profiles(user_id),
    other_id INTEGER NOT NULL,
    UNIQUE(user_id, other_id)
);

CREATE TABLE IF NOT EXISTS followers (
    user_id INTEGER NOT NULL REFERENCES profiles(user_id),
    other_id INTEGER NOT NULL,
    UNIQUE(user_id, other_id)
);
"#;
