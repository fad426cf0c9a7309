//! Incident side-records created by issue reports

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::SqliteIncidentRepository;
use crate::error::Result;
use crate::models::{Incident, IncidentReport};
use crate::util::now_ms;

/// Creates the incident that accompanies every issue report.
///
/// Runs inside the transaction that records the issue, so an error here
/// leaves the task pending. Implementations must work offline; the returned
/// id is stored on the task.
pub trait IncidentRecorder: Send + Sync {
    fn create_incident(&self, conn: &Connection, report: &IncidentReport) -> Result<String>;
}

/// Stores incidents in the local database next to the ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalIncidentRecorder;

impl IncidentRecorder for LocalIncidentRecorder {
    fn create_incident(&self, conn: &Connection, report: &IncidentReport) -> Result<String> {
        let incident = Incident {
            id: Uuid::now_v7().to_string(),
            report: report.clone(),
            created_at: now_ms(),
        };
        SqliteIncidentRepository::new(conn).insert(&incident)?;
        tracing::info!(
            "Created incident {} for task {} ({})",
            incident.id,
            report.task_id,
            report.issue_type
        );
        Ok(incident.id)
    }
}
