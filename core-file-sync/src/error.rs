use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("File {file_id} not found on the remote store")]
    NotFound { file_id: String },

    #[error("Push cancelled")]
    Cancelled,

    #[error("Invalid operation kind: {0}")]
    InvalidKind(String),

    #[error("Invalid operation state: {0}")]
    InvalidState(String),

    #[error("Invalid file location: {0}")]
    InvalidLocation(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FileSyncError>;
