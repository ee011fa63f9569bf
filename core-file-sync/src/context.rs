//! # File Sync Context
//!
//! The orchestrator of the file attachment layer. It owns the operation
//! queue and metadata store references, serializes queue mutation, exposes
//! the public add/delete/push/pull API, and publishes lifecycle events.
//!
//! ## Concurrency model
//!
//! Two independent guards replace the original single critical section:
//!
//! - `mutation` serializes every queue mutation (coalesce + enqueue in
//!   [`queue_operation`](FileSyncContext::queue_operation), the
//!   remove-after-success step of the push loop). This is what upholds the
//!   one-operation-per-file invariant.
//! - `drain` admits a single push loop at a time.
//!
//! A push in progress therefore no longer blocks enqueues for its whole
//! duration; only the short queue-mutation sections are mutually exclusive.
//! Operation execution must not call back into `queue_operation` while the
//! push loop holds the `mutation` guard; the shipped operations do not.
//!
//! Operation execution is strictly sequential in the queue's FIFO order;
//! there is no worker pool.

use crate::client::FilesClient;
use crate::data_source::PathFileDataSource;
use crate::error::{FileSyncError, Result};
use crate::file::{AttachedFile, FileLocation};
use crate::handler::{FileSyncHandler, FileSynchronizationAction};
use crate::metadata::{FileMetadata, FileMetadataStore};
use crate::operations::{
    coalesce, CoalesceDecision, FileOperation, FileOperationKind, FileOperationState,
};
use crate::queue::FileOperationQueue;
use chrono::Utc;
use core_runtime::events::{
    CoreEvent, EventBus, EventStream, FileChangeKind, FileOperationCompleted, OperationSource,
    RecvError, StoreOperationCompleted, StoreOperationKind,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Outcome of one [`pull_files`](FileSyncContext::pull_files) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Files whose stored metadata was refreshed and reported to the handler.
    pub updated: Vec<String>,
    /// Files removed locally because the remote listing no longer has them.
    pub deleted: Vec<String>,
    /// Remote deletions left unapplied because local work is still pending.
    pub deferred: Vec<DeferredDeletion>,
}

/// A remote deletion that was observed but not applied.
///
/// The conflicting local operation stays queued; resolving the divergence is
/// deferred until that operation has been pushed and a later pull runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredDeletion {
    /// The file the remote listing no longer contains.
    pub file_id: String,
    /// Kind of the pending local operation that deferred the deletion.
    pub pending_kind: FileOperationKind,
}

/// Aborts the store-event subscription task when dropped.
pub struct StoreListenerHandle {
    handle: JoinHandle<()>,
}

impl Drop for StoreListenerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Synchronization context for files attached to records.
pub struct FileSyncContext {
    metadata_store: Arc<dyn FileMetadataStore>,
    operation_queue: Arc<dyn FileOperationQueue>,
    files_client: Arc<dyn FilesClient>,
    sync_handler: Arc<dyn FileSyncHandler>,
    event_bus: EventBus,
    mutation: Mutex<()>,
    drain: Mutex<()>,
}

impl FileSyncContext {
    pub fn new(
        metadata_store: Arc<dyn FileMetadataStore>,
        operation_queue: Arc<dyn FileOperationQueue>,
        files_client: Arc<dyn FilesClient>,
        sync_handler: Arc<dyn FileSyncHandler>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            metadata_store,
            operation_queue,
            files_client,
            sync_handler,
            event_bus,
            mutation: Mutex::new(()),
            drain: Mutex::new(()),
        }
    }

    /// The client queued operations upload through.
    pub fn files_client(&self) -> &dyn FilesClient {
        self.files_client.as_ref()
    }

    /// The application-supplied synchronization policy.
    pub fn sync_handler(&self) -> &dyn FileSyncHandler {
        self.sync_handler.as_ref()
    }

    /// The durable metadata store.
    pub fn metadata_store(&self) -> &dyn FileMetadataStore {
        self.metadata_store.as_ref()
    }

    /// The event bus this context publishes completions to.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Record a locally created file and queue its upload.
    ///
    /// The metadata write gates the enqueue: if it fails, no operation is
    /// queued and the error is returned.
    #[instrument(skip(self, file), fields(file_id = %file.id))]
    pub async fn add_file(&self, file: &AttachedFile) -> Result<()> {
        let mut metadata = FileMetadata::from_file(file);
        metadata.location = FileLocation::Local;

        self.metadata_store.create_or_update(&metadata).await?;
        self.queue_operation(FileOperation::create(file.id.clone()))
            .await?;

        self.notify_file_operation(file, FileChangeKind::Create, OperationSource::Local);
        Ok(())
    }

    /// Queue deletion of a file.
    ///
    /// The metadata row is not removed eagerly; it goes when the queued
    /// delete executes (or immediately below, if coalescing annihilated a
    /// pending create for a file that never reached the remote store).
    #[instrument(skip(self, file), fields(file_id = %file.id))]
    pub async fn delete_file(&self, file: &AttachedFile) -> Result<()> {
        let enqueued = self
            .queue_operation(FileOperation::delete(file.id.clone()))
            .await?;

        // Create-then-delete cancels both ways; no queued work is left to
        // clean up the local row.
        if !enqueued
            && self
                .operation_queue
                .get_operation_by_file_id(&file.id)
                .await?
                .is_none()
        {
            if let Some(metadata) = self.metadata_store.get_file_metadata(&file.id).await? {
                self.metadata_store.delete(&metadata).await?;
            }
        }

        self.notify_file_operation(file, FileChangeKind::Delete, OperationSource::Local);
        Ok(())
    }

    /// Coalescing entry point: queue `operation`, resolving it against any
    /// pending operation for the same file.
    ///
    /// Returns whether the new operation was actually enqueued. At most one
    /// operation per file id is in the queue at any observation point.
    pub async fn queue_operation(&self, mut operation: FileOperation) -> Result<bool> {
        let _mutation = self.mutation.lock().await;

        if let Some(mut existing) = self
            .operation_queue
            .get_operation_by_file_id(&operation.file_id)
            .await?
        {
            let decision = coalesce(existing.kind, operation.kind);
            debug!(
                file_id = %operation.file_id,
                existing = %existing.kind,
                incoming = %operation.kind,
                ?decision,
                "Coalescing queued operations"
            );

            match decision {
                CoalesceDecision::KeepExisting => operation.cancel(),
                CoalesceDecision::Replace => {
                    existing.cancel();
                    self.operation_queue.remove(&existing.file_id).await?;
                }
                CoalesceDecision::CancelBoth => {
                    existing.cancel();
                    self.operation_queue.remove(&existing.file_id).await?;
                    operation.cancel();
                }
            }
        }

        if operation.state == FileOperationState::Cancelled {
            return Ok(false);
        }

        self.operation_queue.enqueue(&operation).await?;
        Ok(true)
    }

    /// Drain the operation queue against the remote store.
    ///
    /// Operations execute head-first; each is removed only after it
    /// succeeds, so a failure leaves it at the head for the next push
    /// (at-least-once). The first failure aborts the drain and surfaces the
    /// underlying error.
    ///
    /// The cancellation token gates acquisition of the drain guard and is
    /// re-checked between operations; an in-flight transfer is not
    /// cooperatively cancelled once started.
    #[instrument(skip(self, cancellation))]
    pub async fn push_changes(&self, cancellation: &CancellationToken) -> Result<()> {
        let _drain = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(FileSyncError::Cancelled),
            guard = self.drain.lock() => guard,
        };

        loop {
            if cancellation.is_cancelled() {
                return Err(FileSyncError::Cancelled);
            }

            let Some(mut operation) = self.operation_queue.peek().await? else {
                break;
            };

            debug!(
                file_id = %operation.file_id,
                kind = %operation.kind,
                "Executing queued operation"
            );
            operation.execute(self).await?;

            let _mutation = self.mutation.lock().await;
            self.operation_queue.remove(&operation.file_id).await?;
        }

        Ok(())
    }

    /// Reconcile local file metadata against the remote listing for one
    /// parent record.
    ///
    /// Changed and newly discovered remote files refresh stored metadata and
    /// reach the handler as `Update`; files absent from the listing are
    /// deleted locally unless non-delete local work is still pending, in
    /// which case the deletion is deferred (see [`PullSummary::deferred`]).
    /// Unchanged files are skipped, so repeated pulls are no-ops. The
    /// operation queue is never mutated here.
    #[instrument(skip(self))]
    pub async fn pull_files(&self, table_name: &str, record_id: &str) -> Result<PullSummary> {
        let files = self.files_client.get_files(table_name, record_id).await?;
        let mut summary = PullSummary::default();

        for file in &files {
            let (mut metadata, synthesized) =
                match self.metadata_store.get_file_metadata(&file.id).await? {
                    Some(metadata) => (metadata, false),
                    None => {
                        // Baseline for a file we have never seen; the null
                        // hash/timestamp force the update branch.
                        let mut metadata = FileMetadata::from_file(file);
                        metadata.content_hash = None;
                        metadata.last_modified = None;
                        (metadata, true)
                    }
                };

            let remote_modified = file.last_modified.map(|t| t.with_timezone(&Utc));
            let changed = synthesized
                || metadata.content_hash != file.content_hash
                || metadata.last_modified != remote_modified;

            if !changed {
                continue;
            }

            metadata.content_hash = file.content_hash.clone();
            metadata.last_modified = remote_modified;
            self.metadata_store.create_or_update(&metadata).await?;

            self.sync_handler
                .process_file_synchronization_action(file, FileSynchronizationAction::Update)
                .await?;
            self.notify_file_operation(file, FileChangeKind::Update, OperationSource::ServerPull);
            summary.updated.push(file.id.clone());
        }

        let known = self.metadata_store.get_metadata(table_name, record_id).await?;
        for metadata in known {
            if files.iter().any(|f| f.id == metadata.file_id) {
                continue;
            }

            let pending = self
                .operation_queue
                .get_operation_by_file_id(&metadata.file_id)
                .await?;
            let pending_delete =
                matches!(&pending, Some(op) if op.kind == FileOperationKind::Delete);

            if pending.is_none() || pending_delete {
                self.apply_remote_deletion(&metadata).await?;
                summary.deleted.push(metadata.file_id.clone());
            } else if let Some(operation) = pending {
                warn!(
                    file_id = %metadata.file_id,
                    pending_kind = %operation.kind,
                    "Remote deletion deferred by pending local operation"
                );
                summary.deferred.push(DeferredDeletion {
                    file_id: metadata.file_id.clone(),
                    pending_kind: operation.kind,
                });
            }
        }

        Ok(summary)
    }

    async fn apply_remote_deletion(&self, metadata: &FileMetadata) -> Result<()> {
        self.metadata_store.delete(metadata).await?;

        let file = AttachedFile::from_metadata(metadata);
        self.sync_handler
            .process_file_synchronization_action(&file, FileSynchronizationAction::Delete)
            .await?;
        self.notify_file_operation(&file, FileChangeKind::Delete, OperationSource::ServerPull);

        Ok(())
    }

    /// Upload a file's content straight from a local path, bypassing the
    /// operation queue.
    pub async fn upload_file_from_path(
        &self,
        file: &AttachedFile,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let data_source = PathFileDataSource::new(path);
        let metadata = FileMetadata::from_file(file);
        self.files_client.upload_file(&metadata, &data_source).await
    }

    /// Download a remote file's content to a local path, bypassing the
    /// operation queue.
    pub async fn download_file_to_path(
        &self,
        file: &AttachedFile,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let mut stream = tokio::fs::File::create(path.as_ref()).await?;
        self.files_client.download_to_stream(file, &mut stream).await
    }

    /// Subscribe to record-store completions and react to them for the
    /// lifetime of the returned handle.
    ///
    /// Server-originated inserts/updates/upserts trigger a pull for the
    /// affected record; record deletions purge its file metadata directly
    /// (the record's disappearance is authoritative, so no file-level
    /// delete operations are queued). Dropping the handle releases the
    /// subscription.
    pub fn spawn_store_listener(self: &Arc<Self>) -> StoreListenerHandle {
        let mut stream = EventStream::new(self.event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Store(_)));
        let context = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Ok(CoreEvent::Store(event)) => {
                        context.on_store_operation_completed(event).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Store event subscription lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        StoreListenerHandle { handle }
    }

    async fn on_store_operation_completed(&self, event: StoreOperationCompleted) {
        match event.kind {
            StoreOperationKind::Insert | StoreOperationKind::Update | StoreOperationKind::Upsert => {
                if !event.source.is_server() {
                    return;
                }
                if let Err(e) = self.pull_files(&event.table_name, &event.record_id).await {
                    error!(
                        table_name = %event.table_name,
                        record_id = %event.record_id,
                        error = %e,
                        "Pull triggered by store event failed"
                    );
                }
            }
            StoreOperationKind::Delete => {
                if let Err(e) = self
                    .metadata_store
                    .purge(&event.table_name, &event.record_id)
                    .await
                {
                    error!(
                        table_name = %event.table_name,
                        record_id = %event.record_id,
                        error = %e,
                        "Metadata purge for deleted record failed"
                    );
                }
            }
        }
    }

    /// Publish a file-operation completion.
    ///
    /// Best-effort telemetry: delivery is not transactional with the state
    /// change and a missing subscriber is fine.
    fn notify_file_operation(
        &self,
        file: &AttachedFile,
        kind: FileChangeKind,
        source: OperationSource,
    ) {
        let event = CoreEvent::File(FileOperationCompleted {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            table_name: file.table_name.clone(),
            record_id: file.parent_id.clone(),
            kind,
            source,
        });

        let _ = self.event_bus.emit(event);
    }
}
