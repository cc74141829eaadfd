use serde::{Deserialize, Serialize};

use crate::tamper::TamperEvent;
use crate::timesource::TimeAnchor;

/// Metadata for one stored file. Sealed inside its index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Random id (hex); names the blob and salts the content key.
    pub file_id: String,

    /// Unique within the vault for its whole lifetime.
    pub stored_name: String,

    /// Name the user gave or the source file's basename.
    pub display_name: String,

    /// Unix seconds. Fixed when the entry is added.
    pub unlock_timestamp: u64,

    /// Trusted time when the entry was added (0 if none was ever obtained).
    pub added_at: u64,

    /// Plaintext size in bytes.
    pub size: u64,
}

impl FileEntry {
    /// Blob path relative to the vault directory.
    pub fn blob_name(&self) -> String {
        format!("{}.{}", self.file_id, super::format::BLOB_EXT)
    }

    pub fn is_eligible(&self, anchor: Option<&TimeAnchor>) -> bool {
        anchor.is_some_and(|a| a.permits(self.unlock_timestamp))
    }
}

/// Result of an integrity-checked read of the index.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Entries that authenticated, in insertion order.
    pub entries: Vec<FileEntry>,

    /// Names of records that failed authentication.
    pub damaged: Vec<String>,

    /// The authenticated time anchor, if one is stored and intact.
    pub anchor: Option<TimeAnchor>,

    pub events: Vec<TamperEvent>,
}

impl Listing {
    pub fn find(&self, stored_name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.stored_name == stored_name)
    }
}
