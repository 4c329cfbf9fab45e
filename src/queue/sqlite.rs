//! SQLite-backed [`WorkQueue`].
//!
//! Claims happen inside a transaction: the oldest visible message is
//! selected, then pushed past the visibility horizon with its attempt count
//! incremented. An acknowledged message never redelivers; an unacknowledged
//! one reappears once its horizon passes.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::{Delivery, JobMessage, QueueError, WorkQueue};

/// Durable work queue persisting messages in SQLite.
pub struct SqliteWorkQueue {
    pool: SqlitePool,
    topic: String,
    visibility: Duration,
}

impl SqliteWorkQueue {
    /// Connect to the database at `url` and ensure the schema exists.
    pub async fn connect(
        url: &str,
        topic: impl Into<String>,
        visibility: Duration,
    ) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, topic, visibility).await
    }

    /// Ensure the schema on an existing pool and wrap it.
    pub async fn with_pool(
        pool: SqlitePool,
        topic: impl Into<String>,
        visibility: Duration,
    ) -> Result<Self, QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                payload TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                visible_at INTEGER NOT NULL,
                acked_at INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self {
            pool,
            topic: topic.into(),
            visibility,
        })
    }

    /// Open a private in-memory queue, used by tests.
    pub async fn connect_in_memory(
        topic: impl Into<String>,
        visibility: Duration,
    ) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, topic, visibility).await
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn publish(&self, job: &JobMessage) -> Result<(), QueueError> {
        let now = epoch_seconds();
        sqlx::query(
            "INSERT INTO queue_messages (topic, payload, visible_at, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&self.topic)
        .bind(serde_json::to_string(job)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        tracing::debug!(topic = %self.topic, document_id = %job.document_id, "Job published");
        Ok(())
    }

    async fn pull(&self) -> Result<Option<Delivery>, QueueError> {
        let now = epoch_seconds();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, payload, attempts FROM queue_messages \
             WHERE topic = ? AND acked_at IS NULL AND visible_at <= ? \
             ORDER BY id LIMIT 1",
        )
        .bind(&self.topic)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.get("id");
        let payload: String = row.get("payload");
        let attempts: i64 = row.get("attempts");

        sqlx::query("UPDATE queue_messages SET visible_at = ?, attempts = ? WHERE id = ?")
            .bind(now + self.visibility.as_secs() as i64)
            .bind(attempts + 1)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let job: JobMessage = serde_json::from_str(&payload)?;
        Ok(Some(Delivery {
            receipt: id,
            job,
            attempt: (attempts + 1) as u32,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        sqlx::query("UPDATE queue_messages SET acked_at = ? WHERE id = ?")
            .bind(epoch_seconds())
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_messages WHERE topic = ? AND acked_at IS NULL",
        )
        .bind(&self.topic)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

fn epoch_seconds() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
