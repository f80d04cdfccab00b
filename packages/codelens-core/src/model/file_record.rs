//! Per-file bookkeeping for incremental work

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-seen state of one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Workspace-relative, normalized path
    pub path: String,
    /// SHA-256 of the file content at last parse
    pub content_hash: String,
    /// Modification time in nanoseconds since the epoch
    pub mtime_ns: i64,
    /// Fragments produced on the last parse
    pub fragment_count: usize,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        path: impl Into<String>,
        content_hash: impl Into<String>,
        mtime_ns: i64,
        fragment_count: usize,
        language: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            mtime_ns,
            fragment_count,
            language: language.into(),
            updated_at: Utc::now(),
        }
    }
}
