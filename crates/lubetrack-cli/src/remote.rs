use lubetrack_core::config::RemoteConfig;
use lubetrack_core::models::{PhotoHash, SyncOperation, TaskDelta};
use lubetrack_core::sync::{HttpRemoteAuthority, PushOutcome, RemoteAuthority};

use crate::error::CliError;

const NOT_CONFIGURED: &str = "no remote authority configured";

/// Remote used by the CLI; without a base URL every push stays queued
pub enum CliRemote {
    Http(HttpRemoteAuthority),
    Unconfigured,
}

impl CliRemote {
    pub fn from_config(config: &RemoteConfig) -> Result<Self, CliError> {
        match config.base_url.as_deref() {
            Some(base_url) => Ok(Self::Http(HttpRemoteAuthority::new(
                base_url,
                config.push_timeout(),
            )?)),
            None => Ok(Self::Unconfigured),
        }
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl RemoteAuthority for CliRemote {
    async fn push_task(&self, operation: SyncOperation, delta: &TaskDelta) -> PushOutcome {
        match self {
            Self::Http(remote) => remote.push_task(operation, delta).await,
            Self::Unconfigured => PushOutcome::Transient(NOT_CONFIGURED.to_string()),
        }
    }

    async fn upload_photo(&self, hash: &PhotoHash, bytes: &[u8]) -> Result<String, String> {
        match self {
            Self::Http(remote) => remote.upload_photo(hash, bytes).await,
            Self::Unconfigured => Err(NOT_CONFIGURED.to_string()),
        }
    }

    async fn probe(&self) -> bool {
        match self {
            Self::Http(remote) => remote.probe().await,
            Self::Unconfigured => false,
        }
    }
}
