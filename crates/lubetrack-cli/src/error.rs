use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lubetrack_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),
    #[error("Invalid alert ID: {0}")]
    InvalidAlertId(String),
    #[error("Invalid quantity '{0}': expected an amount followed by ml or g, e.g. 100g")]
    InvalidQuantity(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync is not configured. Set remote.base_url in the config file or LUBETRACK_API_URL.")]
    SyncNotConfigured,
}
