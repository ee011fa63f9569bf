//! # File Operation Queue
//!
//! Ordered, persistent log of pending file operations, FIFO by enqueue time
//! across distinct file ids.
//!
//! The queue is the only record of pending work, so implementations must
//! survive process restarts. The one-operation-per-file invariant is
//! enforced by the sync context at enqueue time (see
//! [`queue_operation`](crate::FileSyncContext::queue_operation)), not by
//! storage-level deduplication; the context likewise serializes mutating
//! access, so implementations do not need their own locking.

use crate::error::{FileSyncError, Result};
use crate::operations::FileOperation;
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::debug;

/// Contract for the durable operation queue.
#[async_trait]
pub trait FileOperationQueue: Send + Sync {
    /// Number of queued operations.
    async fn count(&self) -> Result<usize>;

    /// The head operation, without removing it. Push retries rely on the
    /// head staying in place across a failed execution.
    async fn peek(&self) -> Result<Option<FileOperation>>;

    /// Remove and return the head operation unconditionally.
    async fn dequeue(&self) -> Result<Option<FileOperation>>;

    /// Remove the operation for `file_id`, wherever it sits in the queue.
    /// Used after successful execution and by the coalescing cancel path.
    async fn remove(&self, file_id: &str) -> Result<()>;

    /// The pending operation for `file_id`, if any.
    async fn get_operation_by_file_id(&self, file_id: &str) -> Result<Option<FileOperation>>;

    /// Append an operation at the tail.
    async fn enqueue(&self, operation: &FileOperation) -> Result<()>;
}

/// SQLite-backed operation queue.
///
/// Rows are ordered by a monotonic `seq` so FIFO order survives restarts.
pub struct SqliteOperationQueue {
    pool: SqlitePool,
}

impl SqliteOperationQueue {
    /// Create a queue over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the backing table and index if they do not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_operations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_file_operations_file_id
            ON file_operations(file_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(())
    }
}

fn operation_from_row(row: &SqliteRow) -> Result<FileOperation> {
    Ok(FileOperation {
        file_id: row.get("file_id"),
        kind: row.get::<String, _>("kind").parse()?,
        state: row.get::<String, _>("state").parse()?,
    })
}

#[async_trait]
impl FileOperationQueue for SqliteOperationQueue {
    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_operations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(count as usize)
    }

    async fn peek(&self) -> Result<Option<FileOperation>> {
        let row = sqlx::query(
            r#"
            SELECT file_id, kind, state FROM file_operations
            ORDER BY seq ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        row.as_ref().map(operation_from_row).transpose()
    }

    async fn dequeue(&self) -> Result<Option<FileOperation>> {
        let row = sqlx::query(
            r#"
            SELECT seq, file_id, kind, state FROM file_operations
            ORDER BY seq ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let operation = operation_from_row(&row)?;
        let seq: i64 = row.get("seq");

        sqlx::query("DELETE FROM file_operations WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(Some(operation))
    }

    async fn remove(&self, file_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM file_operations WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(|e| FileSyncError::Database(e.to_string()))?;

        debug!(
            file_id,
            removed = result.rows_affected(),
            "Removed queued operation"
        );

        Ok(())
    }

    async fn get_operation_by_file_id(&self, file_id: &str) -> Result<Option<FileOperation>> {
        let row = sqlx::query(
            r#"
            SELECT file_id, kind, state FROM file_operations
            WHERE file_id = ?
            ORDER BY seq ASC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        row.as_ref().map(operation_from_row).transpose()
    }

    async fn enqueue(&self, operation: &FileOperation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_operations (file_id, kind, state, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&operation.file_id)
        .bind(operation.kind.as_str())
        .bind(operation.state.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        debug!(file_id = %operation.file_id, kind = %operation.kind, "Enqueued operation");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn test_queue() -> SqliteOperationQueue {
        let pool = create_test_pool().await.unwrap();
        let queue = SqliteOperationQueue::new(pool);
        queue.initialize().await.unwrap();
        queue
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let queue = test_queue().await;
        assert_eq!(queue.count().await.unwrap(), 0);
        assert!(queue.peek().await.unwrap().is_none());
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = test_queue().await;
        queue.enqueue(&FileOperation::create("a")).await.unwrap();
        queue.enqueue(&FileOperation::update("b")).await.unwrap();
        queue.enqueue(&FileOperation::delete("c")).await.unwrap();

        assert_eq!(queue.count().await.unwrap(), 3);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().file_id, "a");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().file_id, "b");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().file_id, "c");
    }

    #[tokio::test]
    async fn test_peek_does_not_remove() {
        let queue = test_queue().await;
        queue.enqueue(&FileOperation::create("a")).await.unwrap();

        assert_eq!(queue.peek().await.unwrap().unwrap().file_id, "a");
        assert_eq!(queue.peek().await.unwrap().unwrap().file_id, "a");
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_file_id_keeps_order() {
        let queue = test_queue().await;
        queue.enqueue(&FileOperation::create("a")).await.unwrap();
        queue.enqueue(&FileOperation::create("b")).await.unwrap();
        queue.enqueue(&FileOperation::create("c")).await.unwrap();

        queue.remove("b").await.unwrap();

        assert_eq!(queue.count().await.unwrap(), 2);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().file_id, "a");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().file_id, "c");
    }

    #[tokio::test]
    async fn test_get_operation_by_file_id() {
        let queue = test_queue().await;
        queue.enqueue(&FileOperation::update("a")).await.unwrap();

        let found = queue.get_operation_by_file_id("a").await.unwrap().unwrap();
        assert_eq!(found.kind, crate::operations::FileOperationKind::Update);
        assert!(queue.get_operation_by_file_id("b").await.unwrap().is_none());
    }
}
