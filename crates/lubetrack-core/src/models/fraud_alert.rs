//! Fraud alert model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::task::TaskId;

/// A unique identifier for a fraud alert, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Create a new unique alert ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AlertId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of suspicious activity a detector found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    DuplicatePhoto,
    LocationMismatch,
    RapidCompletion,
    SuspiciousTime,
}

impl AlertType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicatePhoto => "duplicate_photo",
            Self::LocationMismatch => "location_mismatch",
            Self::RapidCompletion => "rapid_completion",
            Self::SuspiciousTime => "suspicious_time",
        }
    }

    /// Severity fixed by alert type before any escalation
    pub const fn base_severity(self) -> Severity {
        match self {
            Self::DuplicatePhoto | Self::LocationMismatch => Severity::High,
            Self::RapidCompletion => Severity::Medium,
            Self::SuspiciousTime => Severity::Low,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "duplicate_photo" => Ok(Self::DuplicatePhoto),
            "location_mismatch" => Ok(Self::LocationMismatch),
            "rapid_completion" => Ok(Self::RapidCompletion),
            "suspicious_time" => Ok(Self::SuspiciousTime),
            other => Err(Error::InvalidInput(format!("unknown alert type: {other}"))),
        }
    }
}

/// Severity level, ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// One level up, saturating at `High`
    #[must_use]
    pub const fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::InvalidInput(format!("unknown severity: {other}"))),
        }
    }
}

/// A reviewable suspicious-activity finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: AlertId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub user_id: String,
    pub task_id: TaskId,
    pub description: String,
    /// Creation timestamp (Unix ms)
    pub timestamp: i64,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<i64>,
}

/// A user with more than one open alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousUser {
    pub user_id: String,
    pub alert_count: usize,
}

/// Supervisor triage overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub unresolved_alerts: usize,
    /// Evidence captures registered since UTC midnight
    pub today_actions: usize,
    pub suspicious_users: Vec<SuspiciousUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::Low.raised(), Severity::Medium);
        assert_eq!(Severity::High.raised(), Severity::High);
    }

    #[test]
    fn test_base_severity_policy() {
        assert_eq!(AlertType::DuplicatePhoto.base_severity(), Severity::High);
        assert_eq!(AlertType::LocationMismatch.base_severity(), Severity::High);
        assert_eq!(AlertType::RapidCompletion.base_severity(), Severity::Medium);
        assert_eq!(AlertType::SuspiciousTime.base_severity(), Severity::Low);
    }

    #[test]
    fn test_alert_type_parse() {
        assert_eq!(
            "duplicate_photo".parse::<AlertType>().unwrap(),
            AlertType::DuplicatePhoto
        );
        assert!("spoofing".parse::<AlertType>().is_err());
    }
}
