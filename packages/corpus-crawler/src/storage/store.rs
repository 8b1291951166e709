use std::path::Path;
use std::time::Duration;

use chrono::DateTime;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection, FromRow};
use tokio::sync::mpsc;

use super::writer::{StoreWriter, WriterTask};
use super::SCHEMA_SQL;
use crate::error::{Result, StorageContext};
use crate::identity::Identity;
use crate::types::{CorpusCounts, Profile, Relationship};

const READ_POOL_SIZE: u32 = 4;

/// A corpus database: read access plus the means to start its single writer.
#[derive(Clone)]
pub struct CorpusStore {
    pool: SqlitePool,
    options: SqliteConnectOptions,
}

/// An unprocessed entry of the pending-ID queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct PendingId {
    pub user_id: i64,
    /// A profile with this ID is already stored.
    pub known: bool,
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: i64,
    handle: String,
    description: String,
    raw: Vec<u8>,
    protected: bool,
    message_watermark: i64,
    following_watermark: i64,
    follower_watermark: i64,
    last_looked_at: Option<i64>,
    processed: bool,
    accepted: bool,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.user_id,
            handle: row.handle,
            description: row.description,
            raw: row.raw,
            protected: row.protected,
            message_watermark: row.message_watermark,
            following_watermark: row.following_watermark,
            follower_watermark: row.follower_watermark,
            last_looked_at: row.last_looked_at.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            processed: row.processed,
            accepted: row.accepted,
        }
    }
}

const PROFILE_COLUMNS: &str = "user_id, handle, description, raw, protected, message_watermark, \
     following_watermark, follower_watermark, last_looked_at, processed, accepted";

impl CorpusStore {
    /// Open (creating if needed) the corpus database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        // Schema goes through its own connection so the read pool never writes.
        let mut conn = options.connect().await.during("open database")?;
        sqlx::query(SCHEMA_SQL)
            .execute(&mut conn)
            .await
            .during("create schema")?;
        conn.close().await.during("close schema connection")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(READ_POOL_SIZE)
            .connect_with(options.clone())
            .await
            .during("open read pool")?;

        tracing::debug!(path = %path.display(), "Opened corpus store");

        Ok(Self { pool, options })
    }

    /// Open the dedicated writer connection and its bounded queue.
    ///
    /// The returned [`WriterTask`] must be driven (spawned) for writes to be
    /// applied; producers block once `capacity` writes are outstanding.
    pub async fn spawn_writer(&self, capacity: usize) -> Result<(StoreWriter, WriterTask)> {
        let conn = self.options.connect().await.during("open writer connection")?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Ok((StoreWriter::new(tx), WriterTask::new(conn, rx)))
    }

    pub async fn profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        let row = match identity {
            Identity::ByHandle(handle) => {
                sqlx::query_as::<_, ProfileRow>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles WHERE handle = ?"
                ))
                .bind(handle)
                .fetch_optional(&self.pool)
                .await
            }
            Identity::ByNumericId(id) => {
                sqlx::query_as::<_, ProfileRow>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?"
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .during("fetch profile")?;

        Ok(row.map(Profile::from))
    }

    pub async fn profile_exists(&self, identity: &Identity) -> Result<bool> {
        let found: Option<(i64,)> = match identity {
            Identity::ByHandle(handle) => {
                sqlx::query_as("SELECT user_id FROM profiles WHERE handle = ?")
                    .bind(handle)
                    .fetch_optional(&self.pool)
                    .await
            }
            Identity::ByNumericId(id) => {
                sqlx::query_as("SELECT user_id FROM profiles WHERE user_id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .during("check profile exists")?;

        Ok(found.is_some())
    }

    pub async fn unprocessed_handles(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT handle FROM pending_handles WHERE processed = 0 ORDER BY rowid")
                .fetch_all(&self.pool)
                .await
                .during("list unprocessed handles")?;
        Ok(rows.into_iter().map(|(h,)| h).collect())
    }

    pub async fn unprocessed_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT user_id FROM pending_ids WHERE processed = 0 ORDER BY user_id")
                .fetch_all(&self.pool)
                .await
                .during("list unprocessed ids")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Unprocessed pending IDs, each flagged with whether its profile is
    /// already stored.
    pub async fn pending_ids(&self) -> Result<Vec<PendingId>> {
        sqlx::query_as::<_, PendingId>(
            r#"
            SELECT q.user_id AS user_id, (p.user_id IS NOT NULL) AS known
            FROM pending_ids q
            LEFT JOIN profiles p ON p.user_id = q.user_id
            WHERE q.processed = 0
            ORDER BY q.user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .during("list pending ids")
        .map_err(Into::into)
    }

    /// The frontier: processed, accepted, unprotected profiles in ID order.
    pub async fn accepted_profiles(&self) -> Result<Vec<Profile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE processed = 1 AND accepted = 1 AND protected = 0 ORDER BY user_id"
        ))
        .fetch_all(&self.pool)
        .await
        .during("list accepted profiles")?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    pub async fn accepted_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM profiles \
             WHERE processed = 1 AND accepted = 1 AND protected = 0 ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .during("list accepted ids")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Processed flag of a pending handle, or `None` if it was never queued.
    pub async fn pending_handle(&self, handle: &str) -> Result<Option<bool>> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT processed FROM pending_handles WHERE handle = ?")
                .bind(handle)
                .fetch_optional(&self.pool)
                .await
                .during("fetch pending handle")?;
        Ok(row.map(|(processed,)| processed))
    }

    /// Processed flag of a pending ID, or `None` if it was never queued.
    pub async fn pending_id(&self, user_id: i64) -> Result<Option<bool>> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT processed FROM pending_ids WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .during("fetch pending id")?;
        Ok(row.map(|(processed,)| processed))
    }

    /// Objects of every stored `kind` edge whose subject is `user_id`.
    pub async fn edges(&self, kind: Relationship, user_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(&format!(
            "SELECT other_id FROM {} WHERE user_id = ? ORDER BY rowid",
            kind.table()
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .during("list edges")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Stored message IDs of a profile, newest first.
    pub async fn message_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT message_id FROM messages WHERE user_id = ? ORDER BY message_id DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .during("list messages")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn counts(&self) -> Result<CorpusCounts> {
        sqlx::query_as::<_, CorpusCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM profiles) AS profiles,
                (SELECT COUNT(*) FROM profiles WHERE processed = 1 AND accepted = 1) AS accepted,
                (SELECT COUNT(*) FROM profiles WHERE protected = 1) AS protected,
                (SELECT COUNT(*) FROM messages) AS messages,
                (SELECT COUNT(*) FROM following) AS following,
                (SELECT COUNT(*) FROM followers) AS followers,
                (SELECT COUNT(*) FROM pending_handles WHERE processed = 0) AS pending_handles,
                (SELECT COUNT(*) FROM pending_ids WHERE processed = 0) AS pending_ids
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .during("count corpus")
        .map_err(Into::into)
    }

    /// Close the read pool. The writer connection closes with its task.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
