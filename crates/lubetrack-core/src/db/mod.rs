//! Database layer for Lubetrack

mod alerts;
mod connection;
mod incidents;
mod migrations;
mod photos;
mod queue;
mod row;
mod tasks;

pub use alerts::SqliteAlertRepository;
pub use connection::{Database, SharedDatabase};
pub use incidents::SqliteIncidentRepository;
pub use photos::SqlitePhotoRepository;
pub use queue::SqliteQueueRepository;
pub use tasks::{SqliteTaskRepository, TaskFilter, TaskRepository};
