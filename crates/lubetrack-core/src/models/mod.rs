//! Data models for Lubetrack

mod fraud_alert;
mod incident;
mod photo;
mod sync_queue;
mod task;

pub use fraud_alert::{AlertId, AlertSummary, AlertType, FraudAlert, Severity, SuspiciousUser};
pub use incident::{Incident, IncidentReport};
pub use photo::{PhotoHash, PhotoRecord};
pub use sync_queue::{QueueState, SyncOperation, SyncQueueEntry, TaskDelta};
pub use task::{
    GeoPoint, IssueDetails, NewTask, PhotoKind, PhotoRef, Quantity, SyncState, TaskExecution,
    TaskId, TaskStatus, Unit,
};
