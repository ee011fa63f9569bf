//! # Files Client
//!
//! The network surface the sync core drives: listing the remote files of a
//! parent record and moving bytes to and from the remote store.
//!
//! [`FilesClient`] is the contract the context and queued operations call.
//! [`StorageFilesClient`] is the default implementation, composed from two
//! narrower collaborators: a [`FileServiceApi`] (the hosting record service,
//! which owns listings and token issuance) and a
//! [`StorageProvider`](crate::storage::StorageProvider) (the blob store
//! transfers themselves). Each transfer requests a freshly scoped token and
//! hands it to the provider.

use crate::data_source::FileDataSource;
use crate::error::Result;
use crate::file::AttachedFile;
use crate::metadata::FileMetadata;
use crate::storage::{
    StoragePermissions, StorageProvider, StorageToken, StorageTokenRequest,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, instrument};

/// Network transfer contract consumed by the sync core.
///
/// Failures surface as [`Transport`](crate::FileSyncError::Transport)
/// errors, or [`NotFound`](crate::FileSyncError::NotFound) when the remote
/// store has no such file.
#[async_trait]
pub trait FilesClient: Send + Sync {
    /// The authoritative remote listing for one parent record.
    async fn get_files(&self, table_name: &str, record_id: &str) -> Result<Vec<AttachedFile>>;

    /// Upload the bytes of `data_source` for `metadata`.
    async fn upload_file(
        &self,
        metadata: &FileMetadata,
        data_source: &dyn FileDataSource,
    ) -> Result<()>;

    /// Stream a remote file's content into `stream`.
    async fn download_to_stream(
        &self,
        file: &AttachedFile,
        stream: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()>;

    /// Delete the remote file.
    async fn delete_file(&self, metadata: &FileMetadata) -> Result<()>;

    /// A direct URI for the file with the given access rights.
    async fn get_file_uri(
        &self,
        file: &AttachedFile,
        permissions: StoragePermissions,
    ) -> Result<String>;
}

/// Record-service surface backing the default client.
///
/// Token issuance itself (validation, signing, expiry) belongs to the
/// hosting service; this contract only carries the request across.
#[async_trait]
pub trait FileServiceApi: Send + Sync {
    /// List the files attached to one parent record.
    async fn list_files(&self, table_name: &str, record_id: &str) -> Result<Vec<AttachedFile>>;

    /// Request a scoped storage token.
    async fn request_token(&self, request: &StorageTokenRequest) -> Result<StorageToken>;

    /// Delete a file through the service endpoint.
    async fn delete_file(&self, metadata: &FileMetadata) -> Result<()>;
}

/// Default [`FilesClient`] over a record service and a storage provider.
pub struct StorageFilesClient {
    api: Arc<dyn FileServiceApi>,
    provider: Arc<dyn StorageProvider>,
    provider_name: String,
}

impl StorageFilesClient {
    pub fn new(
        api: Arc<dyn FileServiceApi>,
        provider: Arc<dyn StorageProvider>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            api,
            provider,
            provider_name: provider_name.into(),
        }
    }

    async fn request_file_token(
        &self,
        file: &AttachedFile,
        permissions: StoragePermissions,
    ) -> Result<StorageToken> {
        let request = StorageTokenRequest {
            permissions,
            target_file: Some(file.clone()),
            scoped_record_id: file.parent_id.clone(),
            provider_name: self.provider_name.clone(),
        };

        self.api.request_token(&request).await
    }
}

#[async_trait]
impl FilesClient for StorageFilesClient {
    #[instrument(skip(self))]
    async fn get_files(&self, table_name: &str, record_id: &str) -> Result<Vec<AttachedFile>> {
        let files = self.api.list_files(table_name, record_id).await?;
        debug!(count = files.len(), "Listed remote files");
        Ok(files)
    }

    async fn upload_file(
        &self,
        metadata: &FileMetadata,
        data_source: &dyn FileDataSource,
    ) -> Result<()> {
        let file = AttachedFile::from_metadata(metadata);
        let token = self
            .request_file_token(&file, StoragePermissions::read_write())
            .await?;

        self.provider.upload_file(metadata, data_source, &token).await
    }

    async fn download_to_stream(
        &self,
        file: &AttachedFile,
        stream: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let token = self
            .request_file_token(file, StoragePermissions::read_only())
            .await?;

        self.provider.download_to_stream(file, stream, &token).await
    }

    async fn delete_file(&self, metadata: &FileMetadata) -> Result<()> {
        self.api.delete_file(metadata).await
    }

    async fn get_file_uri(
        &self,
        file: &AttachedFile,
        permissions: StoragePermissions,
    ) -> Result<String> {
        let token = self.request_file_token(file, permissions).await?;
        self.provider.get_file_uri(&token, &file.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::BytesFileDataSource;
    use crate::error::FileSyncError;
    use crate::storage::StorageTokenScope;
    use bytes::Bytes;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeServiceApi {
        tokens_issued: Mutex<Vec<StorageTokenRequest>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FileServiceApi for FakeServiceApi {
        async fn list_files(&self, _table: &str, _record: &str) -> Result<Vec<AttachedFile>> {
            Ok(vec![])
        }

        async fn request_token(&self, request: &StorageTokenRequest) -> Result<StorageToken> {
            self.tokens_issued.lock().await.push(request.clone());
            Ok(StorageToken {
                raw_token: "sig".to_string(),
                resource_uri: "https://blobs.example/container".to_string(),
                permissions: request.permissions,
                scope: StorageTokenScope::File,
            })
        }

        async fn delete_file(&self, metadata: &FileMetadata) -> Result<()> {
            self.deleted.lock().await.push(metadata.file_id.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        uploads: Mutex<Vec<(String, StoragePermissions)>>,
    }

    #[async_trait]
    impl StorageProvider for FakeProvider {
        async fn download_to_stream(
            &self,
            _file: &AttachedFile,
            _stream: &mut (dyn AsyncWrite + Send + Unpin),
            token: &StorageToken,
        ) -> Result<()> {
            if !token.permissions.read {
                return Err(FileSyncError::Transport("token lacks read".to_string()));
            }
            Ok(())
        }

        async fn upload_file(
            &self,
            metadata: &FileMetadata,
            _data_source: &dyn FileDataSource,
            token: &StorageToken,
        ) -> Result<()> {
            self.uploads
                .lock()
                .await
                .push((metadata.file_id.clone(), token.permissions));
            Ok(())
        }

        async fn get_file_uri(&self, token: &StorageToken, file_name: &str) -> Result<String> {
            Ok(format!("{}/{}?{}", token.resource_uri, file_name, token.raw_token))
        }
    }

    fn client(
        api: Arc<FakeServiceApi>,
        provider: Arc<FakeProvider>,
    ) -> StorageFilesClient {
        StorageFilesClient::new(api, provider, "azure-blob")
    }

    #[tokio::test]
    async fn test_upload_requests_write_token() {
        let api = Arc::new(FakeServiceApi::default());
        let provider = Arc::new(FakeProvider::default());
        let client = client(api.clone(), provider.clone());

        let file = AttachedFile::new("Notes", "42", "photo.jpg");
        let metadata = FileMetadata::from_file(&file);
        let source = BytesFileDataSource::new(Bytes::from_static(b"bytes"));

        client.upload_file(&metadata, &source).await.unwrap();

        let issued = api.tokens_issued.lock().await;
        assert_eq!(issued.len(), 1);
        assert!(issued[0].permissions.write);
        assert_eq!(issued[0].scoped_record_id, "42");
        assert_eq!(issued[0].provider_name, "azure-blob");

        let uploads = provider.uploads.lock().await;
        assert_eq!(uploads[0].0, file.id);
    }

    #[tokio::test]
    async fn test_delete_goes_through_service() {
        let api = Arc::new(FakeServiceApi::default());
        let client = client(api.clone(), Arc::new(FakeProvider::default()));

        let file = AttachedFile::new("Notes", "42", "photo.jpg");
        client
            .delete_file(&FileMetadata::from_file(&file))
            .await
            .unwrap();

        assert_eq!(*api.deleted.lock().await, vec![file.id]);
    }

    #[tokio::test]
    async fn test_file_uri_built_from_token() {
        let api = Arc::new(FakeServiceApi::default());
        let client = client(api, Arc::new(FakeProvider::default()));

        let file = AttachedFile::new("Notes", "42", "photo.jpg");
        let uri = client
            .get_file_uri(&file, StoragePermissions::read_only())
            .await
            .unwrap();

        assert_eq!(uri, "https://blobs.example/container/photo.jpg?sig");
    }
}
