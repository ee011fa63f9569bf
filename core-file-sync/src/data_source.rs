//! Upload data sources.
//!
//! A [`FileDataSource`] resolves to the readable bytes of a file at upload
//! time. The sync handler supplies one per queued upload, so a pending
//! create or update always ships whatever the file contains when the push
//! actually runs.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// Provider of readable bytes for an upload.
#[async_trait]
pub trait FileDataSource: Send + Sync {
    /// Open a fresh reader over the file content.
    async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Data source backed by a file on the local filesystem.
pub struct PathFileDataSource {
    path: PathBuf,
}

impl PathFileDataSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl FileDataSource for PathFileDataSource {
    async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

/// Data source backed by an in-memory buffer.
pub struct BytesFileDataSource {
    data: Bytes,
}

impl BytesFileDataSource {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }
}

#[async_trait]
impl FileDataSource for BytesFileDataSource {
    async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_bytes_data_source_reads_back() {
        let source = BytesFileDataSource::new(Bytes::from_static(b"payload"));

        let mut reader = source.open().await.unwrap();
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();

        assert_eq!(buffer, b"payload");
    }

    #[tokio::test]
    async fn test_path_data_source_reads_file() {
        let path = std::env::temp_dir().join(format!("data-source-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"on disk").await.unwrap();

        let source = PathFileDataSource::new(&path);
        let mut reader = source.open().await.unwrap();
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();

        assert_eq!(buffer, b"on disk");
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_path_data_source_missing_file_is_io_error() {
        let source = PathFileDataSource::new("/nonexistent/definitely-missing");
        assert!(matches!(
            source.open().await,
            Err(crate::error::FileSyncError::Io(_))
        ));
    }
}
