//! Photo evidence model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::task::{PhotoKind, TaskId};

/// Perceptual fingerprint of an evidence image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoHash(String);

impl PhotoHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registered evidence capture. Records are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub hash: PhotoHash,
    /// Capture timestamp (Unix ms)
    pub timestamp: i64,
    pub task_id: TaskId,
    pub user_id: String,
    pub kind: PhotoKind,
    /// Durable URL assigned by the remote authority after upload
    pub remote_url: Option<String>,
}

impl PhotoRecord {
    pub fn new(hash: PhotoHash, task_id: TaskId, user_id: impl Into<String>, kind: PhotoKind) -> Self {
        Self {
            hash,
            timestamp: chrono::Utc::now().timestamp_millis(),
            task_id,
            user_id: user_id.into(),
            kind,
            remote_url: None,
        }
    }
}
