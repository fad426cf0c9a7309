//! Error types for lubetrack-core

use thiserror::Error;

/// Result type alias using lubetrack-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lubetrack-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted on a task in an incompatible state
    #[error("Invalid transition for task {task_id}: {reason}")]
    InvalidTransition { task_id: String, reason: String },

    /// Quality gate hard rule failure
    #[error("Quantity rejected: {0}")]
    ValidationBlocked(String),

    /// Quality gate soft rule failure that the operator has not confirmed
    #[error("Operator confirmation required: {0}")]
    ConfirmationRequired(String),

    /// Evidence photo was already registered for another task
    #[error(
        "Duplicate evidence: photo was already submitted for task {original_task_id} at {original_timestamp}"
    )]
    DuplicateEvidence {
        original_task_id: String,
        original_timestamp: i64,
        alert_id: String,
    },

    /// Image could not be fingerprinted
    #[error("Hashing failed: {0}")]
    HashingFailure(String),

    /// Alert resolution attempted twice
    #[error("Alert already resolved: {0}")]
    AlreadyResolved(String),

    /// Network or server error while pushing to the remote authority
    #[error("Transient sync failure: {0}")]
    TransientSyncFailure(String),

    /// Remote authority refused the payload
    #[error("Remote rejected payload: {0}")]
    RemoteRejection(String),
}

impl Error {
    pub(crate) fn invalid_transition(task_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            task_id: task_id.to_string(),
            reason: reason.into(),
        }
    }
}
