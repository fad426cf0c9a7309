//! Task execution model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::photo::PhotoHash;
use super::Severity;

/// A unique identifier for a task execution, using UUID v7 (time-sortable).
///
/// The same id is used by the local ledger and the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    IssueReported,
    Skipped,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::IssueReported => "issue_reported",
            Self::Skipped => "skipped",
        }
    }

    /// Whether no further transitions are allowed from this status
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "issue_reported" => Ok(Self::IssueReported),
            "skipped" => Ok(Self::Skipped),
            other => Err(Error::InvalidInput(format!("unknown task status: {other}"))),
        }
    }
}

/// Replication state of a task relative to the remote authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    LocalOnly,
    Syncing,
    Synced,
    Conflict,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local_only" => Ok(Self::LocalOnly),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown sync state: {other}"))),
        }
    }
}

/// Lubricant measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Millilitres (oil points)
    Ml,
    /// Grams (grease points)
    G,
}

impl Unit {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ml => "ml",
            Self::G => "g",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ml" => Ok(Self::Ml),
            "g" => Ok(Self::G),
            other => Err(Error::InvalidInput(format!("unknown unit: {other}"))),
        }
    }
}

/// A unit-tagged lubricant amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    pub unit: Unit,
}

impl Quantity {
    pub const fn new(amount: f64, unit: Unit) -> Self {
        Self { amount, unit }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

/// Which side of the job a photo documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoKind {
    Before,
    After,
}

impl PhotoKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl fmt::Display for PhotoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhotoKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(Error::InvalidInput(format!("unknown photo type: {other}"))),
        }
    }
}

/// Reference to an evidence photo attached to a task.
///
/// `hash` is `None` when fingerprinting failed and the photo was let through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoRef {
    pub kind: PhotoKind,
    pub hash: Option<PhotoHash>,
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in metres (haversine)
    pub fn distance_m(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Details captured when a technician reports a problem instead of completing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetails {
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub incident_id: Option<String>,
}

/// One lubrication task instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: TaskId,
    pub work_order_id: String,
    pub lubrication_point_id: String,
    pub status: TaskStatus,
    /// Dose configured for the lubrication point
    pub expected_quantity: Option<Quantity>,
    pub point_location: Option<GeoPoint>,
    pub quantity_used: Option<Quantity>,
    pub photo_refs: Vec<PhotoRef>,
    pub observations: Option<String>,
    pub issue: Option<IssueDetails>,
    pub completed_at: Option<i64>,
    pub executed_by: Option<String>,
    pub sync_state: SyncState,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation (Unix ms)
    pub updated_at: i64,
    /// Last remote acknowledgment (Unix ms)
    pub last_synced_at: Option<i64>,
}

impl TaskExecution {
    /// Whether a completion request carries exactly what this task already holds
    pub fn matches_completion(
        &self,
        quantity_used: &Quantity,
        observations: Option<&str>,
        photo_refs: &[PhotoRef],
    ) -> bool {
        self.status == TaskStatus::Completed
            && self.quantity_used.as_ref() == Some(quantity_used)
            && self.observations.as_deref() == observations
            && self.photo_refs == photo_refs
    }
}

/// Input for scheduling a pending task on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub work_order_id: String,
    pub lubrication_point_id: String,
    pub expected_quantity: Option<Quantity>,
    pub point_location: Option<GeoPoint>,
}

impl NewTask {
    pub fn new(work_order_id: impl Into<String>, lubrication_point_id: impl Into<String>) -> Self {
        Self {
            work_order_id: work_order_id.into(),
            lubrication_point_id: lubrication_point_id.into(),
            expected_quantity: None,
            point_location: None,
        }
    }

    #[must_use]
    pub const fn with_expected_quantity(mut self, quantity: Quantity) -> Self {
        self.expected_quantity = Some(quantity);
        self
    }

    #[must_use]
    pub const fn with_location(mut self, location: GeoPoint) -> Self {
        self.point_location = Some(location);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        let parsed: TaskId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_status_strings_roundtrip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Completed,
            TaskStatus::IssueReported,
            TaskStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_open() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::IssueReported.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_unit_parse_is_case_insensitive() {
        assert_eq!("ML".parse::<Unit>().unwrap(), Unit::Ml);
        assert_eq!(" g ".parse::<Unit>().unwrap(), Unit::G);
        assert!("kg".parse::<Unit>().is_err());
    }

    #[test]
    fn test_distance_between_nearby_points() {
        let a = GeoPoint::new(-33.4489, -70.6693);
        let b = GeoPoint::new(-33.4489, -70.6593);
        let distance = a.distance_m(&b);
        // ~0.01 degree of longitude at this latitude is roughly 930 m
        assert!(distance > 900.0 && distance < 960.0, "{distance}");
        assert!(a.distance_m(&a) < f64::EPSILON);
    }
}
