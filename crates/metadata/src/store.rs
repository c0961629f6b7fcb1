//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ChunkRepo, TodoRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Path value that selects a throwaway in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: TodoRepo + ChunkRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Close the underlying connections. Further calls fail.
    async fn close(&self);
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and migrate it.
    pub async fn new(path: impl AsRef<Path>, busy_timeout_secs: u64) -> MetadataResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == IN_MEMORY_PATH;

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        };
        let opts = opts
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            // One connection: a single logical owner mutates the store, and an
            // in-memory database only lives as long as its connection.
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), in_memory, "metadata store opened");
        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;

        // Rows written before media was tagged carry no schema version.
        let legacy: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM todos WHERE schema_version < ?",
        )
        .bind(satchel_core::media::MEDIA_SCHEMA_VERSION)
        .fetch_one(&self.pool)
        .await?;
        if legacy > 0 {
            tracing::info!(
                legacy_rows = legacy,
                "todo rows use legacy media encoding; they are decoded on read"
            );
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::ChunkStats;
    use satchel_core::{ChunkId, RecordState, TodoId, TodoRecord};
    use time::OffsetDateTime;

    #[async_trait]
    impl TodoRepo for SqliteStore {
        async fn insert_todo(&self, record: &TodoRecord) -> MetadataResult<()> {
            let row = TodoRow::from_record(record)?;
            let result = sqlx::query(
                "INSERT INTO todos (id, text, media, state, schema_version, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(row.id)
            .bind(&row.text)
            .bind(&row.media)
            .bind(&row.state)
            .bind(row.schema_version)
            .bind(row.created_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                    MetadataError::AlreadyExists(format!("todo {} already exists", record.id)),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_todo(&self, id: TodoId) -> MetadataResult<Option<TodoRecord>> {
            let row = sqlx::query_as::<_, TodoRow>("SELECT * FROM todos WHERE id = ?")
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
            row.map(TodoRow::into_record).transpose()
        }

        async fn list_todos(&self) -> MetadataResult<Vec<TodoRecord>> {
            let rows = sqlx::query_as::<_, TodoRow>("SELECT * FROM todos ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;
            rows.into_iter().map(TodoRow::into_record).collect()
        }

        async fn mark_pending_delete(&self, id: TodoId) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE todos SET state = ? WHERE id = ?")
                .bind(RecordState::PendingDelete.as_str())
                .bind(id.as_i64())
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("todo {id} not found")));
            }
            Ok(())
        }

        async fn delete_todo(&self, id: TodoId) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM todos WHERE id = ?")
                .bind(id.as_i64())
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("todo {id} not found")));
            }
            Ok(())
        }

        async fn delete_todo_with_chunks(
            &self,
            id: TodoId,
            chunks: &[ChunkId],
        ) -> MetadataResult<u64> {
            // Single transaction: the record never outlives or predeceases its chunks.
            let mut tx = self.pool.begin().await?;

            let mut removed = 0;
            for chunk_id in chunks {
                let result = sqlx::query("DELETE FROM chunks WHERE chunk_id = ?")
                    .bind(chunk_id.to_string())
                    .execute(&mut *tx)
                    .await?;
                removed += result.rows_affected();
            }

            let result = sqlx::query("DELETE FROM todos WHERE id = ?")
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the chunk deletes.
                return Err(MetadataError::NotFound(format!("todo {id} not found")));
            }

            tx.commit().await?;
            Ok(removed)
        }

        async fn max_todo_id(&self) -> MetadataResult<Option<i64>> {
            let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM todos")
                .fetch_one(&self.pool)
                .await?;
            Ok(max)
        }
    }

    #[async_trait]
    impl ChunkRepo for SqliteStore {
        async fn put_chunk(&self, id: &ChunkId, data: &[u8]) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, file_id, seq, data, size_bytes, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET data = excluded.data, size_bytes = excluded.size_bytes
                "#,
            )
            .bind(id.to_string())
            .bind(id.file_id().as_i64())
            .bind(i64::from(id.seq()))
            .bind(data)
            .bind(data.len() as i64)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_chunk(&self, id: &ChunkId) -> MetadataResult<Option<Vec<u8>>> {
            let data: Option<Vec<u8>> =
                sqlx::query_scalar("SELECT data FROM chunks WHERE chunk_id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(data)
        }

        async fn chunk_exists(&self, id: &ChunkId) -> MetadataResult<bool> {
            let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM chunks WHERE chunk_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.is_some())
        }

        async fn delete_chunks(&self, ids: &[ChunkId]) -> MetadataResult<u64> {
            if ids.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await?;
            let mut removed = 0;
            for id in ids {
                let result = sqlx::query("DELETE FROM chunks WHERE chunk_id = ?")
                    .bind(id.to_string())
                    .execute(&mut *tx)
                    .await?;
                removed += result.rows_affected();
            }
            tx.commit().await?;
            Ok(removed)
        }

        async fn list_chunk_ids(&self) -> MetadataResult<Vec<ChunkId>> {
            let rows = sqlx::query_as::<_, ChunkRow>(
                "SELECT chunk_id, file_id, seq, size_bytes, created_at FROM chunks ORDER BY file_id, seq",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.iter().map(ChunkRow::id).collect())
        }

        async fn chunk_stats(&self) -> MetadataResult<ChunkStats> {
            let (count, total_size, files): (i64, i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), COUNT(DISTINCT file_id) FROM chunks",
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(ChunkStats {
                count: count as u64,
                total_size: total_size as u64,
                files: files as u64,
            })
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Todo records; media holds the tagged MediaRef JSON
CREATE TABLE IF NOT EXISTS todos (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    media TEXT NULL,
    state TEXT NOT NULL DEFAULT 'committed' CHECK (state IN ('committed', 'pending_delete')),
    schema_version INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_todos_state ON todos(state) WHERE state != 'committed';

-- Attachment chunks keyed "<file_id>_<seq>"
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    file_id INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    data BLOB NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_file_seq ON chunks(file_id, seq);
"#;
