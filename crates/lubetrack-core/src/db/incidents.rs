//! Incident repository

use crate::error::Result;
use crate::models::{Incident, IncidentReport, TaskId};
use rusqlite::{params, Connection};

use super::row;

/// Local `SQLite` storage for incident side-records
pub struct SqliteIncidentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteIncidentRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, incident: &Incident) -> Result<()> {
        let report = &incident.report;
        self.conn.execute(
            "INSERT INTO incidents
                (id, task_id, issue_type, severity, description, reported_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                incident.id,
                report.task_id.as_str(),
                report.issue_type,
                report.severity.as_str(),
                report.description,
                report.reported_by,
                incident.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<Incident>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, issue_type, severity, description, reported_by, created_at
             FROM incidents
             WHERE task_id = ?
             ORDER BY created_at DESC",
        )?;
        let incidents = stmt
            .query_map(params![task_id.as_str()], |row| {
                Ok(Incident {
                    id: row.get(0)?,
                    report: IncidentReport {
                        task_id: row::parsed(row, 1)?,
                        issue_type: row.get(2)?,
                        severity: row::parsed(row, 3)?,
                        description: row.get(4)?,
                        reported_by: row.get(5)?,
                    },
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(incidents)
    }
}
