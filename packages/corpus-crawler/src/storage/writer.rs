//! The single ordered write path.
//!
//! Every task that mutates the corpus holds a cloned [`StoreWriter`]. Writes
//! are queued on one bounded channel and applied in order by the
//! [`WriterTask`], which owns the only writing connection. Compound writes
//! commit atomically.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::error::{CrawlError, Result, StorageContext, StorageError};
use crate::types::{FetchedMessage, Relationship, ResolutionOutcome, ResolvedProfile};

pub(crate) enum WriteOp {
    EnqueueHandles(Vec<String>),
    EnqueueIds(Vec<i64>),
    RecordProfiles(Vec<(ResolvedProfile, ResolutionOutcome)>),
    MarkHandlesProcessed(Vec<String>),
    MarkIdsProcessed(Vec<i64>),
    StoreEdges {
        kind: Relationship,
        subject: i64,
        objects: Vec<i64>,
    },
    AdvanceRelationshipWatermark {
        kind: Relationship,
        user_id: i64,
        watermark: i64,
    },
    StoreMessages {
        user_id: i64,
        messages: Vec<FetchedMessage>,
    },
    AdvanceMessageWatermark {
        user_id: i64,
        watermark: i64,
        looked_at: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
}

impl WriteOp {
    fn name(&self) -> &'static str {
        match self {
            WriteOp::EnqueueHandles(_) => "enqueue_handles",
            WriteOp::EnqueueIds(_) => "enqueue_ids",
            WriteOp::RecordProfiles(_) => "record_profiles",
            WriteOp::MarkHandlesProcessed(_) => "mark_handles_processed",
            WriteOp::MarkIdsProcessed(_) => "mark_ids_processed",
            WriteOp::StoreEdges { .. } => "store_edges",
            WriteOp::AdvanceRelationshipWatermark { .. } => "advance_relationship_watermark",
            WriteOp::StoreMessages { .. } => "store_messages",
            WriteOp::AdvanceMessageWatermark { .. } => "advance_message_watermark",
            WriteOp::Flush(_) => "flush",
        }
    }
}

/// Producer handle for the write queue. Cheap to clone.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::Sender<WriteOp>,
}

impl StoreWriter {
    pub(crate) fn new(tx: mpsc::Sender<WriteOp>) -> Self {
        Self { tx }
    }

    /// Queue a write, waiting while the queue is full.
    async fn submit(&self, op: WriteOp) -> Result<()> {
        self.tx.send(op).await.map_err(|_| CrawlError::WriterClosed)
    }

    /// Add handles to the pending-handle queue. Known handles are left as is.
    pub async fn enqueue_handles(&self, handles: Vec<String>) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::EnqueueHandles(handles)).await
    }

    /// Add IDs to the pending-ID queue. Known IDs are left as is.
    pub async fn enqueue_ids(&self, ids: Vec<i64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::EnqueueIds(ids)).await
    }

    /// Store one resolved profile (insert-or-ignore) and record its
    /// processed/accepted flags in the same transaction.
    pub async fn record_profile(&self, profile: ResolvedProfile, outcome: ResolutionOutcome) -> Result<()> {
        self.submit(WriteOp::RecordProfiles(vec![(profile, outcome)])).await
    }

    pub async fn record_profiles(&self, profiles: Vec<(ResolvedProfile, ResolutionOutcome)>) -> Result<()> {
        if profiles.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::RecordProfiles(profiles)).await
    }

    pub async fn mark_handles_processed(&self, handles: Vec<String>) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::MarkHandlesProcessed(handles)).await
    }

    pub async fn mark_ids_processed(&self, ids: Vec<i64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::MarkIdsProcessed(ids)).await
    }

    /// Record `kind` edges from `subject` and queue every object for
    /// resolution, atomically.
    pub async fn store_edges(&self, kind: Relationship, subject: i64, objects: Vec<i64>) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::StoreEdges {
            kind,
            subject,
            objects,
        })
        .await
    }

    /// Raise a relationship watermark. Never lowers it.
    pub async fn advance_relationship_watermark(
        &self,
        kind: Relationship,
        user_id: i64,
        watermark: i64,
    ) -> Result<()> {
        self.submit(WriteOp::AdvanceRelationshipWatermark {
            kind,
            user_id,
            watermark,
        })
        .await
    }

    pub async fn store_messages(&self, user_id: i64, messages: Vec<FetchedMessage>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::StoreMessages { user_id, messages }).await
    }

    /// Raise the message watermark (never lowering it) and stamp the
    /// last-looked-at time.
    pub async fn advance_message_watermark(
        &self,
        user_id: i64,
        watermark: i64,
        looked_at: DateTime<Utc>,
    ) -> Result<()> {
        self.submit(WriteOp::AdvanceMessageWatermark {
            user_id,
            watermark,
            looked_at,
        })
        .await
    }

    /// Wait until every write queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteOp::Flush(tx)).await?;
        rx.await.map_err(|_| CrawlError::WriterClosed)
    }
}

/// Consumer side of the write queue; owns the writing connection.
pub struct WriterTask {
    conn: SqliteConnection,
    rx: mpsc::Receiver<WriteOp>,
}

impl WriterTask {
    pub(crate) fn new(conn: SqliteConnection, rx: mpsc::Receiver<WriteOp>) -> Self {
        Self { conn, rx }
    }

    /// Apply queued writes in order until every [`StoreWriter`] is dropped.
    /// The first failed write stops the task.
    pub async fn run(mut self) -> Result<()> {
        let mut applied: u64 = 0;

        while let Some(op) = self.rx.recv().await {
            let name = op.name();
            if let Err(e) = apply(&mut self.conn, op).await {
                tracing::error!(operation = name, error = %e, "Store write failed");
                self.rx.close();
                return Err(e.into());
            }
            applied += 1;
        }

        tracing::debug!(applied, "Write queue closed");
        if let Err(e) = self.conn.close().await {
            tracing::warn!(error = %e, "Failed to close writer connection");
        }
        Ok(())
    }
}

async fn apply(conn: &mut SqliteConnection, op: WriteOp) -> std::result::Result<(), StorageError> {
    match op {
        WriteOp::EnqueueHandles(handles) => {
            let mut tx = conn.begin().await.during("enqueue_handles")?;
            for handle in handles {
                sqlx::query("INSERT OR IGNORE INTO pending_handles (handle) VALUES (?)")
                    .bind(handle)
                    .execute(&mut *tx)
                    .await
                    .during("enqueue_handles")?;
            }
            tx.commit().await.during("enqueue_handles")
        }

        WriteOp::EnqueueIds(ids) => {
            let mut tx = conn.begin().await.during("enqueue_ids")?;
            for id in ids {
                sqlx::query("INSERT OR IGNORE INTO pending_ids (user_id) VALUES (?)")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .during("enqueue_ids")?;
            }
            tx.commit().await.during("enqueue_ids")
        }

        WriteOp::RecordProfiles(profiles) => {
            let mut tx = conn.begin().await.during("record_profiles")?;
            for (profile, outcome) in profiles {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO profiles (user_id, handle, description, raw, protected)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(profile.id)
                .bind(&profile.handle)
                .bind(profile.description.as_deref().unwrap_or_default())
                .bind(&profile.raw)
                .bind(profile.protected)
                .execute(&mut *tx)
                .await
                .during("store_profile")?;

                let accepted = outcome.accepted();
                sqlx::query("UPDATE profiles SET processed = 1, accepted = ? WHERE user_id = ?")
                    .bind(accepted)
                    .bind(profile.id)
                    .execute(&mut *tx)
                    .await
                    .during("mark_profile_processed")?;
            }
            tx.commit().await.during("record_profiles")
        }

        WriteOp::MarkHandlesProcessed(handles) => {
            let mut tx = conn.begin().await.during("mark_handles_processed")?;
            for handle in handles {
                sqlx::query(
                    r#"
                    INSERT INTO pending_handles (handle, processed) VALUES (?, 1)
                    ON CONFLICT(handle) DO UPDATE SET processed = 1
                    "#,
                )
                .bind(handle)
                .execute(&mut *tx)
                .await
                .during("mark_handles_processed")?;
            }
            tx.commit().await.during("mark_handles_processed")
        }

        WriteOp::MarkIdsProcessed(ids) => {
            let mut tx = conn.begin().await.during("mark_ids_processed")?;
            for id in ids {
                sqlx::query(
                    r#"
                    INSERT INTO pending_ids (user_id, processed) VALUES (?, 1)
                    ON CONFLICT(user_id) DO UPDATE SET processed = 1
                    "#,
                )
                .bind(id)
                .execute(&mut *tx)
                .await
                .during("mark_ids_processed")?;
            }
            tx.commit().await.during("mark_ids_processed")
        }

        WriteOp::StoreEdges {
            kind,
            subject,
            objects,
        } => {
            let insert_edge = format!(
                "INSERT OR IGNORE INTO {} (user_id, other_id) VALUES (?, ?)",
                kind.table()
            );
            let mut tx = conn.begin().await.during("store_edges")?;
            for object in objects {
                sqlx::query(&insert_edge)
                    .bind(subject)
                    .bind(object)
                    .execute(&mut *tx)
                    .await
                    .during("store_edges")?;
                sqlx::query("INSERT OR IGNORE INTO pending_ids (user_id) VALUES (?)")
                    .bind(object)
                    .execute(&mut *tx)
                    .await
                    .during("enqueue_ids")?;
            }
            tx.commit().await.during("store_edges")
        }

        WriteOp::AdvanceRelationshipWatermark {
            kind,
            user_id,
            watermark,
        } => {
            let column = kind.watermark_column();
            sqlx::query(&format!(
                "UPDATE profiles SET {column} = MAX({column}, ?) WHERE user_id = ?"
            ))
            .bind(watermark)
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .during("advance_relationship_watermark")
            .map(|_| ())
        }

        WriteOp::StoreMessages { user_id, messages } => {
            let mut tx = conn.begin().await.during("store_messages")?;
            for message in messages {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO messages (message_id, user_id, created_at, lang, text, raw)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(message.id)
                .bind(user_id)
                .bind(message.created_at.timestamp())
                .bind(message.lang)
                .bind(message.text)
                .bind(message.raw)
                .execute(&mut *tx)
                .await
                .during("store_messages")?;
            }
            tx.commit().await.during("store_messages")
        }

        WriteOp::AdvanceMessageWatermark {
            user_id,
            watermark,
            looked_at,
        } => sqlx::query(
            r#"
            UPDATE profiles
            SET message_watermark = MAX(message_watermark, ?), last_looked_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(watermark)
        .bind(looked_at.timestamp())
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .during("advance_message_watermark")
        .map(|_| ()),

        WriteOp::Flush(done) => {
            // The caller may have stopped waiting; nothing to undo.
            let _ = done.send(());
            Ok(())
        }
    }
}
