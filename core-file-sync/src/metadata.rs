//! # File Metadata Store
//!
//! Durable key/value mapping from file identity to the last-known state of
//! the file: content hash, size, modification time and parent record linkage.
//!
//! A metadata row exists for every file the client currently knows about,
//! whether it originated locally or was discovered in a remote listing. The
//! store is consulted by queued operations when they execute and by the pull
//! reconciliation algorithm, and is independent of the pending-operation
//! queue.

use crate::error::{FileSyncError, Result};
use crate::file::{AttachedFile, FileLocation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Locally cached description of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Identity of the file; unique across the store.
    pub file_id: String,
    /// Display name, also the blob name on the remote store.
    pub file_name: String,
    /// Content length in bytes.
    pub length: u64,
    /// Content hash last seen for this file, if any.
    pub content_hash: Option<String>,
    /// Last modification time, normalized to UTC.
    pub last_modified: Option<DateTime<Utc>>,
    /// Where the file's authoritative copy currently lives.
    pub location: FileLocation,
    /// Table of the parent record.
    pub parent_table: String,
    /// Identifier of the parent record.
    pub parent_record_id: String,
}

impl FileMetadata {
    /// Build a metadata row from a file descriptor.
    ///
    /// The location defaults to [`FileLocation::Remote`]; callers recording a
    /// local mutation overwrite it.
    pub fn from_file(file: &AttachedFile) -> Self {
        Self {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            length: file.length,
            content_hash: file.content_hash.clone(),
            last_modified: file.last_modified.map(|t| t.with_timezone(&Utc)),
            location: FileLocation::Remote,
            parent_table: file.table_name.clone(),
            parent_record_id: file.parent_id.clone(),
        }
    }
}

/// Contract for the durable metadata store.
///
/// Mutating access is serialized by the sync context; implementations only
/// need durable key/value semantics keyed by `file_id`.
#[async_trait]
pub trait FileMetadataStore: Send + Sync {
    /// Insert the row, or overwrite the existing row with the same `file_id`.
    async fn create_or_update(&self, metadata: &FileMetadata) -> Result<()>;

    /// Look up a row by file id.
    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>>;

    /// All rows attached to one parent record.
    async fn get_metadata(&self, table_name: &str, record_id: &str) -> Result<Vec<FileMetadata>>;

    /// Remove one row.
    async fn delete(&self, metadata: &FileMetadata) -> Result<()>;

    /// Remove every row attached to one parent record.
    async fn purge(&self, table_name: &str, record_id: &str) -> Result<()>;
}

/// SQLite-backed metadata store.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Create a store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the backing table and indexes if they do not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_metadata (
                file_id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                length INTEGER NOT NULL,
                content_hash TEXT,
                last_modified TEXT,
                location TEXT NOT NULL,
                parent_table TEXT NOT NULL,
                parent_record_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_file_metadata_parent
            ON file_metadata(parent_table, parent_record_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(())
    }
}

fn metadata_from_row(row: &SqliteRow) -> Result<FileMetadata> {
    let last_modified = match row.get::<Option<String>, _>("last_modified") {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| FileSyncError::InvalidTimestamp(e.to_string()))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(FileMetadata {
        file_id: row.get("file_id"),
        file_name: row.get("file_name"),
        length: row.get::<i64, _>("length") as u64,
        content_hash: row.get("content_hash"),
        last_modified,
        location: row.get::<String, _>("location").parse()?,
        parent_table: row.get("parent_table"),
        parent_record_id: row.get("parent_record_id"),
    })
}

#[async_trait]
impl FileMetadataStore for SqliteMetadataStore {
    async fn create_or_update(&self, metadata: &FileMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_metadata (
                file_id, file_name, length, content_hash, last_modified,
                location, parent_table, parent_record_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                file_name = excluded.file_name,
                length = excluded.length,
                content_hash = excluded.content_hash,
                last_modified = excluded.last_modified,
                location = excluded.location,
                parent_table = excluded.parent_table,
                parent_record_id = excluded.parent_record_id
            "#,
        )
        .bind(&metadata.file_id)
        .bind(&metadata.file_name)
        .bind(metadata.length as i64)
        .bind(&metadata.content_hash)
        .bind(metadata.last_modified.map(|t| t.to_rfc3339()))
        .bind(metadata.location.as_str())
        .bind(&metadata.parent_table)
        .bind(&metadata.parent_record_id)
        .execute(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT file_id, file_name, length, content_hash, last_modified,
                   location, parent_table, parent_record_id
            FROM file_metadata
            WHERE file_id = ?
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        row.as_ref().map(metadata_from_row).transpose()
    }

    async fn get_metadata(&self, table_name: &str, record_id: &str) -> Result<Vec<FileMetadata>> {
        let rows = sqlx::query(
            r#"
            SELECT file_id, file_name, length, content_hash, last_modified,
                   location, parent_table, parent_record_id
            FROM file_metadata
            WHERE parent_table = ? AND parent_record_id = ?
            ORDER BY file_id ASC
            "#,
        )
        .bind(table_name)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

        rows.iter().map(metadata_from_row).collect()
    }

    async fn delete(&self, metadata: &FileMetadata) -> Result<()> {
        sqlx::query("DELETE FROM file_metadata WHERE file_id = ?")
            .bind(&metadata.file_id)
            .execute(&self.pool)
            .await
            .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn purge(&self, table_name: &str, record_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM file_metadata WHERE parent_table = ? AND parent_record_id = ?")
            .bind(table_name)
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| FileSyncError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn test_store() -> SqliteMetadataStore {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteMetadataStore::new(pool);
        store.initialize().await.unwrap();
        store
    }

    fn sample(file_id: &str, record_id: &str) -> FileMetadata {
        FileMetadata {
            file_id: file_id.to_string(),
            file_name: format!("{file_id}.jpg"),
            length: 512,
            content_hash: Some("H1".to_string()),
            last_modified: Some("2024-05-01T12:00:00Z".parse().unwrap()),
            location: FileLocation::Remote,
            parent_table: "Notes".to_string(),
            parent_record_id: record_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let store = test_store().await;
        let metadata = sample("f1", "42");

        store.create_or_update(&metadata).await.unwrap();

        let found = store.get_file_metadata("f1").await.unwrap().unwrap();
        assert_eq!(found, metadata);
        assert!(store.get_file_metadata("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_or_update_overwrites() {
        let store = test_store().await;
        let mut metadata = sample("f1", "42");
        store.create_or_update(&metadata).await.unwrap();

        metadata.content_hash = Some("H2".to_string());
        store.create_or_update(&metadata).await.unwrap();

        let found = store.get_file_metadata("f1").await.unwrap().unwrap();
        assert_eq!(found.content_hash.as_deref(), Some("H2"));
    }

    #[tokio::test]
    async fn test_get_metadata_scopes_to_parent_record() {
        let store = test_store().await;
        store.create_or_update(&sample("f1", "42")).await.unwrap();
        store.create_or_update(&sample("f2", "42")).await.unwrap();
        store.create_or_update(&sample("f3", "43")).await.unwrap();

        let rows = store.get_metadata("Notes", "42").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|m| m.parent_record_id == "42"));
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let store = test_store().await;
        store.create_or_update(&sample("f1", "42")).await.unwrap();
        store.create_or_update(&sample("f2", "42")).await.unwrap();

        let f1 = store.get_file_metadata("f1").await.unwrap().unwrap();
        store.delete(&f1).await.unwrap();
        assert!(store.get_file_metadata("f1").await.unwrap().is_none());

        store.purge("Notes", "42").await.unwrap();
        assert!(store.get_metadata("Notes", "42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_timestamp_round_trip() {
        let store = test_store().await;
        let mut metadata = sample("f1", "42");
        metadata.last_modified = None;
        metadata.content_hash = None;

        store.create_or_update(&metadata).await.unwrap();

        let found = store.get_file_metadata("f1").await.unwrap().unwrap();
        assert!(found.last_modified.is_none());
        assert!(found.content_hash.is_none());
    }
}
