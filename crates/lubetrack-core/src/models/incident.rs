//! Incident side-record model

use serde::{Deserialize, Serialize};

use super::task::TaskId;
use super::Severity;

/// Problem reported in the field in place of a completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub task_id: TaskId,
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub reported_by: String,
}

/// Stored incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub report: IncidentReport,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}
