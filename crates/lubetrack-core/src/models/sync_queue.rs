//! Sync queue model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::task::{PhotoRef, Quantity, TaskExecution, TaskId, TaskStatus};
use super::IssueDetails;

/// Kind of remote write an entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// The remote has never acknowledged this task
    Create,
    Update,
}

impl SyncOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl FromStr for SyncOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            other => Err(Error::InvalidInput(format!("unknown sync operation: {other}"))),
        }
    }
}

/// Drain state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Queued,
    InFlight,
    /// Parked for manual review; never drained automatically
    Conflict,
}

impl QueueState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_flight" => Ok(Self::InFlight),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown queue state: {other}"))),
        }
    }
}

/// Snapshot of the task fields the remote authority stores, keyed by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDelta {
    pub id: TaskId,
    pub work_order_id: String,
    pub lubrication_point_id: String,
    pub status: TaskStatus,
    pub quantity_used: Option<Quantity>,
    pub photo_refs: Vec<PhotoRef>,
    pub observations: Option<String>,
    pub issue: Option<IssueDetails>,
    pub completed_at: Option<i64>,
    pub executed_by: Option<String>,
}

impl From<&TaskExecution> for TaskDelta {
    fn from(task: &TaskExecution) -> Self {
        Self {
            id: task.id,
            work_order_id: task.work_order_id.clone(),
            lubrication_point_id: task.lubrication_point_id.clone(),
            status: task.status,
            quantity_used: task.quantity_used,
            photo_refs: task.photo_refs.clone(),
            observations: task.observations.clone(),
            issue: task.issue.clone(),
            completed_at: task.completed_at,
            executed_by: task.executed_by.clone(),
        }
    }
}

/// A pending remote write, durable until acknowledged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    /// Monotonic enqueue order
    pub seq: i64,
    pub task_id: TaskId,
    pub operation: SyncOperation,
    pub payload: TaskDelta,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    pub state: QueueState,
    /// Earliest time the entry may be pushed again (Unix ms)
    pub next_attempt_at: Option<i64>,
}
