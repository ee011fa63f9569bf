//! File descriptors exchanged between the application, the sync context and
//! the remote file store.

use crate::error::{FileSyncError, Result};
use crate::metadata::FileMetadata;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Where a file's authoritative copy currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLocation {
    /// Created locally; the content has not reached the remote store yet.
    Local,
    /// Known from the remote listing.
    Remote,
    /// A transfer is in flight.
    Pending,
}

impl FileLocation {
    /// String representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            FileLocation::Local => "local",
            FileLocation::Remote => "remote",
            FileLocation::Pending => "pending",
        }
    }
}

impl FromStr for FileLocation {
    type Err = FileSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(FileLocation::Local),
            "remote" => Ok(FileLocation::Remote),
            "pending" => Ok(FileLocation::Pending),
            _ => Err(FileSyncError::InvalidLocation(s.to_string())),
        }
    }
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file attached to a parent record.
///
/// This is the descriptor shape used on the public API and on the wire: the
/// application hands one to [`add_file`](crate::FileSyncContext::add_file),
/// and the remote listing returns them from
/// [`get_files`](crate::FilesClient::get_files). Timestamps keep whatever
/// offset the remote store reported; comparisons normalize to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    /// Opaque identity, unique across the system.
    pub id: String,
    /// Display name, also the blob name on the remote store.
    pub name: String,
    /// Content length in bytes.
    pub length: u64,
    /// Content hash as reported by the remote store, if known.
    pub content_hash: Option<String>,
    /// Last modification time as reported by the remote store, if known.
    pub last_modified: Option<DateTime<FixedOffset>>,
    /// Table of the parent record this file is attached to.
    pub table_name: String,
    /// Identifier of the parent record.
    pub parent_id: String,
}

impl AttachedFile {
    /// Create a descriptor for a new local file with a generated id.
    pub fn new(
        table_name: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            length: 0,
            content_hash: None,
            last_modified: None,
            table_name: table_name.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Set the content length.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    /// Set the content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Rebuild a descriptor from a stored metadata row.
    pub fn from_metadata(metadata: &FileMetadata) -> Self {
        Self {
            id: metadata.file_id.clone(),
            name: metadata.file_name.clone(),
            length: metadata.length,
            content_hash: metadata.content_hash.clone(),
            last_modified: metadata.last_modified.map(|t| t.fixed_offset()),
            table_name: metadata.parent_table.clone(),
            parent_id: metadata.parent_record_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let a = AttachedFile::new("Notes", "42", "a.jpg");
        let b = AttachedFile::new("Notes", "42", "b.jpg");
        assert_ne!(a.id, b.id);
        assert_eq!(a.table_name, "Notes");
        assert_eq!(a.parent_id, "42");
    }

    #[test]
    fn test_location_round_trip() {
        for location in [FileLocation::Local, FileLocation::Remote, FileLocation::Pending] {
            assert_eq!(location.as_str().parse::<FileLocation>().unwrap(), location);
        }
        assert!("elsewhere".parse::<FileLocation>().is_err());
    }

    #[test]
    fn test_from_metadata_preserves_identity() {
        let file = AttachedFile::new("Notes", "42", "photo.jpg").with_length(1024);
        let metadata = FileMetadata::from_file(&file);
        let back = AttachedFile::from_metadata(&metadata);
        assert_eq!(back.id, file.id);
        assert_eq!(back.name, "photo.jpg");
        assert_eq!(back.length, 1024);
    }
}
