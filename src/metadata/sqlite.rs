//! SQLite-backed [`MetadataStore`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use uuid::Uuid;

use super::{DocumentRecord, DocumentState, MetadataError, MetadataStore, format_rfc3339, now_rfc3339};

/// Metadata store persisting document records in SQLite.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Connect to the database at `url` and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, MetadataError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Ensure the schema on an existing pool and wrap it.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, MetadataError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                created_at TEXT NOT NULL,
                state TEXT NOT NULL,
                preview TEXT,
                failure TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory database, used by tests.
    pub async fn connect_in_memory() -> Result<Self, MetadataError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create(&self, id: Uuid, filename: &str) -> Result<(), MetadataError> {
        sqlx::query(
            "INSERT INTO documents (id, filename, created_at, state) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(filename)
        .bind(now_rfc3339())
        .bind(DocumentState::Uploaded.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<DocumentRecord, MetadataError> {
        let row = sqlx::query(
            "SELECT id, filename, created_at, state, preview, failure FROM documents WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(MetadataError::NotFound(id)),
        }
    }

    async fn set_state(
        &self,
        id: Uuid,
        state: DocumentState,
        preview: Option<&str>,
        failure: Option<&str>,
    ) -> Result<(), MetadataError> {
        // Single guarded UPDATE: the state rank comparison makes the write
        // monotonic even under concurrent redeliveries.
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET state = ?2,
                preview = COALESCE(?3, preview),
                failure = COALESCE(?4, failure)
            WHERE id = ?1
              AND (CASE state
                     WHEN 'uploaded' THEN 0
                     WHEN 'queued' THEN 1
                     WHEN 'processing' THEN 2
                     ELSE 3
                   END)
                < (CASE ?2
                     WHEN 'uploaded' THEN 0
                     WHEN 'queued' THEN 1
                     WHEN 'processing' THEN 2
                     ELSE 3
                   END)
            "#,
        )
        .bind(id.to_string())
        .bind(state.as_str())
        .bind(preview)
        .bind(failure)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM documents WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !exists {
                return Err(MetadataError::NotFound(id));
            }
            tracing::debug!(document_id = %id, state = state.as_str(), "Skipped stale state write");
        }
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<DocumentRecord>, MetadataError> {
        let rows = sqlx::query(
            "SELECT id, filename, created_at, state, preview, failure FROM documents \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn list_stalled(
        &self,
        state: DocumentState,
        older_than: Duration,
    ) -> Result<Vec<DocumentRecord>, MetadataError> {
        let cutoff = format_rfc3339(time::OffsetDateTime::now_utc() - older_than);

        let rows = sqlx::query(
            "SELECT id, filename, created_at, state, preview, failure FROM documents \
             WHERE state = ? AND created_at <= ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(state.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn ping(&self) -> Result<(), MetadataError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_record(row: &SqliteRow) -> Result<DocumentRecord, MetadataError> {
    let id: String = row.get("id");
    let state: String = row.get("state");
    Ok(DocumentRecord {
        id: Uuid::parse_str(&id).map_err(|err| MetadataError::Invalid(err.to_string()))?,
        filename: row.get("filename"),
        created_at: row.get("created_at"),
        state: DocumentState::parse(&state)
            .ok_or_else(|| MetadataError::Invalid(format!("unknown state '{state}'")))?,
        preview: row.get("preview"),
        failure: row.get("failure"),
    })
}
