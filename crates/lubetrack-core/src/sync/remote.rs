//! Remote authority interface and its HTTP implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{PhotoHash, SyncOperation, TaskDelta};
use crate::util::{compact_text, is_http_url};

/// Result of pushing one queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Remote stored exactly this payload
    Ack,
    /// Remote refused the payload; needs manual review
    Rejected(String),
    /// Network, timeout or server error; retry later
    Transient(String),
}

/// The server-side system of record.
///
/// Futures must be `Send` so the drain can run on a spawned task.
pub trait RemoteAuthority: Send + Sync + 'static {
    fn push_task(
        &self,
        operation: SyncOperation,
        delta: &TaskDelta,
    ) -> impl Future<Output = PushOutcome> + Send;

    /// Upload evidence bytes and return their durable URL
    fn upload_photo(
        &self,
        hash: &PhotoHash,
        bytes: &[u8],
    ) -> impl Future<Output = std::result::Result<String, String>> + Send;

    /// Cheap liveness check
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

impl<T: RemoteAuthority> RemoteAuthority for Arc<T> {
    fn push_task(
        &self,
        operation: SyncOperation,
        delta: &TaskDelta,
    ) -> impl Future<Output = PushOutcome> + Send {
        (**self).push_task(operation, delta)
    }

    fn upload_photo(
        &self,
        hash: &PhotoHash,
        bytes: &[u8],
    ) -> impl Future<Output = std::result::Result<String, String>> + Send {
        (**self).upload_photo(hash, bytes)
    }

    fn probe(&self) -> impl Future<Output = bool> + Send {
        (**self).probe()
    }
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    operation: SyncOperation,
    task: &'a TaskDelta,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// JSON-over-HTTP client for the Lubetrack API
#[derive(Debug, Clone)]
pub struct HttpRemoteAuthority {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteAuthority {
    /// Builds a client for an explicit API base URL.
    ///
    /// `timeout` bounds every request, including photo uploads.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteAuthority for HttpRemoteAuthority {
    async fn push_task(&self, operation: SyncOperation, delta: &TaskDelta) -> PushOutcome {
        let url = format!("{}/v1/task-executions/{}", self.base_url, delta.id);
        let response = match self
            .client
            .put(url)
            .header("Accept", "application/json")
            .json(&PushRequest {
                operation,
                task: delta,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return PushOutcome::Transient(format!("Push request failed: {error}")),
        };

        let status = response.status();
        if status.is_success() {
            return PushOutcome::Ack;
        }
        let body = response.text().await.unwrap_or_default();
        classify_failure(status, &body)
    }

    async fn upload_photo(
        &self,
        hash: &PhotoHash,
        bytes: &[u8],
    ) -> std::result::Result<String, String> {
        let url = format!(
            "{}/v1/evidence/{}",
            self.base_url,
            urlencoding::encode(hash.as_str())
        );
        let response = self
            .client
            .put(url)
            .header("Accept", "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|error| format!("Upload request failed: {error}"))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "Upload request failed with HTTP {status}: {}",
                compact_text(&body)
            ));
        }
        let payload = response
            .json::<UploadResponse>()
            .await
            .map_err(|error| format!("Failed to parse upload response: {error}"))?;
        Ok(payload.url)
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/v1/health", self.base_url);
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Health probe failed: {error}");
                false
            }
        }
    }
}

/// Map a non-2xx response: throttling, timeouts and server errors are
/// retried, any other client error is a rejection.
fn classify_failure(status: StatusCode, body: &str) -> PushOutcome {
    let message = format!("HTTP {}: {}", status.as_u16(), compact_text(body));
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        PushOutcome::Transient(message)
    } else {
        PushOutcome::Rejected(message)
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("API base URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        assert_eq!(
            normalize_base_url(" https://api.example.com/ ").unwrap(),
            "https://api.example.com"
        );
        assert!(normalize_base_url("api.example.com").is_err());
        assert!(normalize_base_url("  ").is_err());
    }

    #[test]
    fn classify_failure_separates_transient_from_rejection() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(matches!(
                classify_failure(status, ""),
                PushOutcome::Transient(_)
            ));
        }
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::CONFLICT,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(matches!(
                classify_failure(status, "bad quantity"),
                PushOutcome::Rejected(message) if message.contains("bad quantity")
            ));
        }
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(HttpRemoteAuthority::new("ftp://x", Duration::from_secs(1)).is_err());
        let client =
            HttpRemoteAuthority::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn unreachable_server_fails_probe() {
        // port 9 (discard) on localhost is closed in test environments
        let client =
            HttpRemoteAuthority::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(!client.probe().await);
    }
}
