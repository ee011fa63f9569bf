//! # File Operations
//!
//! The queued unit of pending work for one file identity, its lifecycle
//! state machine, and the coalescing rules that keep the operation queue at
//! one pending operation per file.
//!
//! ## State machine
//!
//! ```text
//! Pending ──→ InProcess ──→ Succeeded
//!    │            │
//!    │            └──→ Failed ──→ InProcess (retried on the next push)
//!    └──→ Cancelled (coalescing only)
//! ```
//!
//! `Succeeded` removes the operation from the queue; `Failed` leaves it at
//! the head to be retried. `Cancelled` is reachable only through coalescing
//! and is never persisted.
//!
//! ## Coalescing
//!
//! When an operation is queued for a file that already has one pending, the
//! pair is resolved by [`coalesce`], an exhaustive matrix over the two kinds.
//! The policy:
//!
//! - a pending `Create` followed by `Delete` annihilates: the file never
//!   reached the remote store, so neither operation has anything left to do;
//! - `Delete` supersedes a pending `Update`, and `Create` supersedes a
//!   pending `Delete` (re-creation uploads over the stale remote content);
//! - every other pair keeps the pending operation: uploads resolve their
//!   data source at execution time, so a pending `Create`/`Update` always
//!   ships the latest content.

use crate::context::FileSyncContext;
use crate::error::{FileSyncError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The kind of work a queued operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationKind {
    /// Upload a newly created local file.
    Create,
    /// Re-upload a locally modified file.
    Update,
    /// Delete the file remotely and drop its metadata.
    Delete,
}

impl FileOperationKind {
    /// String representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperationKind::Create => "create",
            FileOperationKind::Update => "update",
            FileOperationKind::Delete => "delete",
        }
    }
}

impl FromStr for FileOperationKind {
    type Err = FileSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(FileOperationKind::Create),
            "update" => Ok(FileOperationKind::Update),
            "delete" => Ok(FileOperationKind::Delete),
            _ => Err(FileSyncError::InvalidKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for FileOperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<FileOperationKind> for core_runtime::events::FileChangeKind {
    fn from(kind: FileOperationKind) -> Self {
        match kind {
            FileOperationKind::Create => Self::Create,
            FileOperationKind::Update => Self::Update,
            FileOperationKind::Delete => Self::Delete,
        }
    }
}

/// Lifecycle state of one operation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationState {
    /// Queued, waiting for the next push.
    Pending,
    /// Currently executing.
    InProcess,
    /// Executed successfully; about to be removed from the queue.
    Succeeded,
    /// Execution failed; stays queued and is retried on the next push.
    Failed,
    /// Superseded during coalescing; never enqueued or already removed.
    Cancelled,
}

impl FileOperationState {
    /// String representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperationState::Pending => "pending",
            FileOperationState::InProcess => "inprocess",
            FileOperationState::Succeeded => "succeeded",
            FileOperationState::Failed => "failed",
            FileOperationState::Cancelled => "cancelled",
        }
    }

    /// True once the instance will make no further transitions on its own.
    /// `Failed` instances still get re-executed by the push loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileOperationState::Succeeded
                | FileOperationState::Failed
                | FileOperationState::Cancelled
        )
    }
}

impl FromStr for FileOperationState {
    type Err = FileSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(FileOperationState::Pending),
            "inprocess" => Ok(FileOperationState::InProcess),
            "succeeded" => Ok(FileOperationState::Succeeded),
            "failed" => Ok(FileOperationState::Failed),
            "cancelled" => Ok(FileOperationState::Cancelled),
            _ => Err(FileSyncError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for FileOperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a coalescing pair resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceDecision {
    /// The pending operation absorbs the incoming one.
    KeepExisting,
    /// The incoming operation replaces the pending one.
    Replace,
    /// Both operations cancel out; nothing stays queued.
    CancelBoth,
}

/// Resolve what happens when `incoming` is queued for a file that already
/// has a pending operation of kind `existing`.
pub fn coalesce(existing: FileOperationKind, incoming: FileOperationKind) -> CoalesceDecision {
    use FileOperationKind::*;

    match (existing, incoming) {
        // The pending create proves the file never reached the remote store.
        (Create, Delete) => CoalesceDecision::CancelBoth,
        (Update, Delete) => CoalesceDecision::Replace,
        (Delete, Create) => CoalesceDecision::Replace,
        (Create, Create) | (Create, Update) => CoalesceDecision::KeepExisting,
        (Update, Create) | (Update, Update) => CoalesceDecision::KeepExisting,
        (Delete, Update) | (Delete, Delete) => CoalesceDecision::KeepExisting,
    }
}

/// A queued unit of pending work for one file identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Identity of the file this operation targets.
    pub file_id: String,
    /// What the operation does when executed.
    pub kind: FileOperationKind,
    /// Lifecycle state of this instance.
    pub state: FileOperationState,
}

impl FileOperation {
    /// A pending operation of the given kind.
    pub fn new(file_id: impl Into<String>, kind: FileOperationKind) -> Self {
        Self {
            file_id: file_id.into(),
            kind,
            state: FileOperationState::Pending,
        }
    }

    /// A pending create (upload of a new local file).
    pub fn create(file_id: impl Into<String>) -> Self {
        Self::new(file_id, FileOperationKind::Create)
    }

    /// A pending update (re-upload of modified content).
    pub fn update(file_id: impl Into<String>) -> Self {
        Self::new(file_id, FileOperationKind::Update)
    }

    /// A pending delete.
    pub fn delete(file_id: impl Into<String>) -> Self {
        Self::new(file_id, FileOperationKind::Delete)
    }

    /// Mark this instance as superseded by coalescing.
    pub(crate) fn cancel(&mut self) {
        self.state = FileOperationState::Cancelled;
    }

    /// Execute this operation against the context's collaborators.
    ///
    /// Transitions to `InProcess` on entry and to `Succeeded`/`Failed` on
    /// exit; a failed operation stays in the queue for the next push.
    pub(crate) async fn execute(&mut self, context: &FileSyncContext) -> Result<()> {
        self.state = FileOperationState::InProcess;

        match self.run(context).await {
            Ok(()) => {
                self.state = FileOperationState::Succeeded;
                Ok(())
            }
            Err(e) => {
                self.state = FileOperationState::Failed;
                Err(e)
            }
        }
    }

    async fn run(&self, context: &FileSyncContext) -> Result<()> {
        match self.kind {
            FileOperationKind::Create | FileOperationKind::Update => {
                // The metadata row may have been purged since this was
                // queued; nothing is left to upload then.
                let Some(metadata) = context
                    .metadata_store()
                    .get_file_metadata(&self.file_id)
                    .await?
                else {
                    return Ok(());
                };

                let data_source = context.sync_handler().get_data_source(&metadata).await?;
                context
                    .files_client()
                    .upload_file(&metadata, data_source.as_ref())
                    .await
            }
            FileOperationKind::Delete => {
                let Some(metadata) = context
                    .metadata_store()
                    .get_file_metadata(&self.file_id)
                    .await?
                else {
                    return Ok(());
                };

                // Remote delete first: a transport failure leaves both the
                // metadata row and this operation in place for retry. A file
                // the remote store never saw counts as already deleted.
                match context.files_client().delete_file(&metadata).await {
                    Ok(()) | Err(FileSyncError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }

                context.metadata_store().delete(&metadata).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            FileOperationKind::Create,
            FileOperationKind::Update,
            FileOperationKind::Delete,
        ] {
            assert_eq!(kind.as_str().parse::<FileOperationKind>().unwrap(), kind);
        }
        assert!("rename".parse::<FileOperationKind>().is_err());
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            FileOperationState::Pending,
            FileOperationState::InProcess,
            FileOperationState::Succeeded,
            FileOperationState::Failed,
            FileOperationState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<FileOperationState>().unwrap(), state);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(FileOperationState::Succeeded.is_terminal());
        assert!(FileOperationState::Failed.is_terminal());
        assert!(FileOperationState::Cancelled.is_terminal());
        assert!(!FileOperationState::Pending.is_terminal());
        assert!(!FileOperationState::InProcess.is_terminal());
    }

    #[test]
    fn test_new_operation_is_pending() {
        let op = FileOperation::create("f1");
        assert_eq!(op.kind, FileOperationKind::Create);
        assert_eq!(op.state, FileOperationState::Pending);
    }

    #[test]
    fn test_coalesce_matrix() {
        use CoalesceDecision::*;
        use FileOperationKind::*;

        let cases = [
            ((Create, Create), KeepExisting),
            ((Create, Update), KeepExisting),
            ((Create, Delete), CancelBoth),
            ((Update, Create), KeepExisting),
            ((Update, Update), KeepExisting),
            ((Update, Delete), Replace),
            ((Delete, Create), Replace),
            ((Delete, Update), KeepExisting),
            ((Delete, Delete), KeepExisting),
        ];

        for ((existing, incoming), expected) in cases {
            assert_eq!(
                coalesce(existing, incoming),
                expected,
                "({existing}, {incoming})"
            );
        }
    }
}
