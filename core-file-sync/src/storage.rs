//! Token-scoped storage access.
//!
//! The remote blob store is never addressed with long-lived credentials:
//! every transfer is authorized by a short-lived [`StorageToken`] scoped to
//! one file or one parent record. Token issuance lives in the hosting
//! service and stays outside this crate; the shapes exchanged with it are
//! defined here, along with the [`StorageProvider`] contract that performs
//! the actual transfer once a token is in hand.

use crate::data_source::FileDataSource;
use crate::error::Result;
use crate::file::AttachedFile;
use crate::metadata::FileMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

/// Access rights carried by a storage token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoragePermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl StoragePermissions {
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            delete: false,
        }
    }

    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            delete: false,
        }
    }

    pub const fn full() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
        }
    }
}

/// How broadly a storage token applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTokenScope {
    /// Valid for a single file.
    File,
    /// Valid for every file attached to one parent record.
    Record,
}

/// A short-lived credential for direct storage access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageToken {
    /// The credential material itself (e.g. a SAS string).
    pub raw_token: String,
    /// The resource the token grants access to.
    pub resource_uri: String,
    /// Rights granted by the token.
    pub permissions: StoragePermissions,
    /// Whether the token covers one file or a whole parent record.
    pub scope: StorageTokenScope,
}

/// Input to token issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTokenRequest {
    /// Rights being requested.
    pub permissions: StoragePermissions,
    /// The file the token should cover, when file-scoped.
    pub target_file: Option<AttachedFile>,
    /// The parent record the token should cover.
    pub scoped_record_id: String,
    /// Which storage provider the token is for.
    pub provider_name: String,
}

/// Performs transfers against the remote blob store using issued tokens.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Stream the file's content into `stream`.
    async fn download_to_stream(
        &self,
        file: &AttachedFile,
        stream: &mut (dyn AsyncWrite + Send + Unpin),
        token: &StorageToken,
    ) -> Result<()>;

    /// Upload the bytes produced by `data_source` under the metadata's name.
    async fn upload_file(
        &self,
        metadata: &FileMetadata,
        data_source: &dyn FileDataSource,
        token: &StorageToken,
    ) -> Result<()>;

    /// A direct URI for the named file, authorized by `token`.
    async fn get_file_uri(&self, token: &StorageToken, file_name: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_presets() {
        assert!(StoragePermissions::read_only().read);
        assert!(!StoragePermissions::read_only().write);
        assert!(StoragePermissions::read_write().write);
        assert!(!StoragePermissions::read_write().delete);
        assert!(StoragePermissions::full().delete);
    }
}
