//! # File Attachment Sync Core
//!
//! Synchronization core of an offline-first file attachment layer: files
//! attached to records keep working while the client is offline, and local
//! mutations reconcile against the remote file store once connectivity
//! resumes.
//!
//! ## Components
//!
//! - **Operation model** (`operations`): Create/Update/Delete as a closed
//!   tagged type with a lifecycle state machine and an exhaustive coalescing
//!   matrix
//! - **Operation Queue** (`queue`): ordered, durable log of pending work,
//!   one operation per file
//! - **Metadata Store** (`metadata`): last-known state of every file the
//!   client knows about
//! - **Files Client** (`client`) and **Storage Provider** (`storage`):
//!   the network surface, with token-scoped blob access
//! - **Sync Handler** (`handler`): application-supplied policy for pulled
//!   changes and upload data sources
//! - **File Sync Context** (`context`): the orchestrator wiring it all
//!   together: queueing with coalescing, the push drain loop, and pull
//!   reconciliation
//!
//! ## Flow
//!
//! Local mutation → [`FileSyncContext::add_file`] /
//! [`FileSyncContext::delete_file`] → metadata write + enqueue.
//! Connectivity restored → [`FileSyncContext::push_changes`] drains the
//! queue. A server-originated record change arrives on the event bus →
//! [`FileSyncContext::pull_files`] reconciles the record's files.

pub mod client;
pub mod context;
pub mod data_source;
pub mod db;
pub mod error;
pub mod file;
pub mod handler;
pub mod metadata;
pub mod operations;
pub mod queue;
pub mod storage;

pub use client::{FileServiceApi, FilesClient, StorageFilesClient};
pub use context::{DeferredDeletion, FileSyncContext, PullSummary, StoreListenerHandle};
pub use data_source::{BytesFileDataSource, FileDataSource, PathFileDataSource};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{FileSyncError, Result};
pub use file::{AttachedFile, FileLocation};
pub use handler::{FileSyncHandler, FileSynchronizationAction};
pub use metadata::{FileMetadata, FileMetadataStore, SqliteMetadataStore};
pub use operations::{
    coalesce, CoalesceDecision, FileOperation, FileOperationKind, FileOperationState,
};
pub use queue::{FileOperationQueue, SqliteOperationQueue};
pub use storage::{
    StoragePermissions, StorageProvider, StorageToken, StorageTokenRequest, StorageTokenScope,
};
