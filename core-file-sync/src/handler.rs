//! Application-supplied synchronization policy.
//!
//! The sync core decides *when* something changed; the handler decides what
//! that means for the application: where pulled files land on disk, what
//! bytes a queued upload ships, how records referencing a deleted file are
//! cleaned up.

use crate::data_source::FileDataSource;
use crate::error::Result;
use crate::file::AttachedFile;
use crate::metadata::FileMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the reconciliation algorithm observed about a file.
///
/// Newly discovered remote files are reported as `Update`, not `Create`:
/// from the handler's perspective both mean "fetch the current content".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSynchronizationAction {
    Create,
    Update,
    Delete,
}

impl From<FileSynchronizationAction> for core_runtime::events::FileChangeKind {
    fn from(action: FileSynchronizationAction) -> Self {
        match action {
            FileSynchronizationAction::Create => Self::Create,
            FileSynchronizationAction::Update => Self::Update,
            FileSynchronizationAction::Delete => Self::Delete,
        }
    }
}

/// Pluggable policy object consulted by the sync context.
#[async_trait]
pub trait FileSyncHandler: Send + Sync {
    /// React to a pulled change (download content, drop local copies, ...).
    async fn process_file_synchronization_action(
        &self,
        file: &AttachedFile,
        action: FileSynchronizationAction,
    ) -> Result<()>;

    /// Supply the bytes for a queued upload of `metadata`.
    async fn get_data_source(&self, metadata: &FileMetadata) -> Result<Box<dyn FileDataSource>>;
}
