//! Runtime configuration for the ledger, gate, detectors and sync engine.
//!
//! Loaded from a JSON file whose sections are all optional; missing values
//! fall back to field defaults. Environment overrides are applied on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Environment variable overriding [`RemoteConfig::base_url`]
pub const ENV_API_URL: &str = "LUBETRACK_API_URL";
/// Environment variable overriding [`AppConfig::db_path`]
pub const ENV_DB_PATH: &str = "LUBETRACK_DB_PATH";

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Local database file; the platform data dir is used when unset
    pub db_path: Option<String>,
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
    pub quality: QualityConfig,
    pub evidence: EvidenceConfig,
    pub fraud: FraudConfig,
}

/// Remote authority endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    pub push_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            push_timeout_secs: 15,
        }
    }
}

impl RemoteConfig {
    pub const fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

/// Drain loop, liveness probe and retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Interval between drains while online with a non-empty queue
    pub drain_interval_secs: u64,
    /// Interval between liveness probes
    pub probe_interval_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Transient failures tolerated before an entry is parked as a conflict
    pub max_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            drain_interval_secs: 30,
            probe_interval_secs: 20,
            backoff_base_ms: 2_000,
            backoff_max_ms: 300_000,
            max_retries: 8,
        }
    }
}

impl SyncSettings {
    pub const fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

/// Quantity plausibility bands, as fractions of the expected dose
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    /// Reported amounts above `expected * hard_ceiling_multiplier` are refused
    pub hard_ceiling_multiplier: f64,
    /// Relative deviation above which the operator must confirm
    pub soft_tolerance: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            hard_ceiling_multiplier: 3.0,
            soft_tolerance: 0.25,
        }
    }
}

/// Evidence fingerprinting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EvidenceConfig {
    /// Fraction of image height at the bottom reserved for the watermark
    pub watermark_band: f32,
    /// Hashes within this Hamming distance count as the same photo
    pub max_hamming_distance: u32,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            watermark_band: 0.12,
            max_hamming_distance: 0,
        }
    }
}

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Heuristic fraud detectors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FraudConfig {
    /// Completions by one user closer together than this are flagged
    pub rapid_completion_secs: i64,
    /// First hour (site-local, inclusive) of the expected working window
    pub working_hours_start: u32,
    /// Last hour (site-local, exclusive) of the expected working window
    pub working_hours_end: u32,
    /// Site offset from UTC in minutes, e.g. -180 for UTC-03:00
    pub utc_offset_minutes: i32,
    /// Allowed distance between reported position and the point
    pub location_radius_m: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            rapid_completion_secs: 120,
            working_hours_start: 6,
            working_hours_end: 22,
            utc_offset_minutes: 0,
            location_radius_m: 250.0,
        }
    }
}

impl AppConfig {
    /// Parse a configuration document
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid configuration JSON: {error}")))
    }

    /// Load from a file, returning defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let payload = std::fs::read_to_string(path)?;
        Self::from_json(&payload)
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`)
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.remote.base_url = Some(url);
        }
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(path);
        }
        self
    }

    /// Reject values the components cannot operate with
    pub fn validate(mut self) -> Result<Self> {
        if let Some(url) = normalize_text_option(self.remote.base_url.take()) {
            if !is_http_url(&url) {
                return Err(Error::Config(
                    "remote.base_url must include http:// or https://".to_string(),
                ));
            }
            self.remote.base_url = Some(url.trim_end_matches('/').to_string());
        }
        if self.remote.push_timeout_secs == 0 {
            return Err(Error::Config(
                "remote.push_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.sync.drain_interval_secs == 0 || self.sync.probe_interval_secs == 0 {
            return Err(Error::Config(
                "sync intervals must be greater than zero".to_string(),
            ));
        }
        if self.sync.backoff_base_ms > self.sync.backoff_max_ms {
            return Err(Error::Config(
                "sync.backoff_base_ms must not exceed sync.backoff_max_ms".to_string(),
            ));
        }
        if !(self.quality.soft_tolerance > 0.0
            && self.quality.hard_ceiling_multiplier > 1.0 + self.quality.soft_tolerance)
        {
            return Err(Error::Config(
                "quality bands must satisfy 0 < soft_tolerance and hard_ceiling_multiplier > 1 + soft_tolerance"
                    .to_string(),
            ));
        }
        if !(0.0..0.5).contains(&self.evidence.watermark_band) {
            return Err(Error::Config(
                "evidence.watermark_band must be in [0, 0.5)".to_string(),
            ));
        }
        if self.fraud.working_hours_start >= 24 || self.fraud.working_hours_end > 24 {
            return Err(Error::Config(
                "fraud working hours must be within 0..=24".to_string(),
            ));
        }
        if self.fraud.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(Error::Config(
                "fraud.utc_offset_minutes must be within -840..=840".to_string(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.quality.hard_ceiling_multiplier, 3.0);
        assert_eq!(config.sync.max_retries, 8);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_json(
            r#"{ "remote": { "base_url": "https://api.example.com/" }, "sync": { "max_retries": 3 } }"#,
        )
        .unwrap()
        .validate()
        .unwrap();

        assert_eq!(
            config.remote.base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(config.remote.push_timeout_secs, 15);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.drain_interval_secs, 30);
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = AppConfig::from_json(r#"{ "remote": { "token": "x" } }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn validate_rejects_bad_url_and_bands() {
        let mut config = AppConfig::default();
        config.remote.base_url = Some("api.example.com".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.quality.hard_ceiling_multiplier = 1.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn site_offset_is_read_and_bounded() {
        let config =
            AppConfig::from_json(r#"{ "fraud": { "utc_offset_minutes": -180 } }"#).unwrap();
        assert_eq!(config.validate().unwrap().fraud.utc_offset_minutes, -180);

        let mut config = AppConfig::default();
        config.fraud.utc_offset_minutes = 15 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let config = AppConfig::default().with_env_overrides(|key| match key {
            ENV_API_URL => Some(" https://field.example.com ".to_string()),
            ENV_DB_PATH => Some("/tmp/ledger.db".to_string()),
            _ => None,
        });
        assert_eq!(
            config.remote.base_url.as_deref(),
            Some("https://field.example.com")
        );
        assert_eq!(config.db_path.as_deref(), Some("/tmp/ledger.db"));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
