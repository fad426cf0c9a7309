//! Fraud alert repository

use crate::error::Result;
use crate::models::{AlertId, FraudAlert, Severity, SuspiciousUser, TaskId};
use rusqlite::{params, Connection, OptionalExtension};

use super::row;

const ALERT_COLUMNS: &str = "id, alert_type, severity, user_id, task_id, description,
    timestamp, resolved, resolved_by, resolved_at";

/// `SQLite` storage for fraud alerts
pub struct SqliteAlertRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAlertRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<FraudAlert> {
        Ok(FraudAlert {
            id: row::parsed(row, 0)?,
            alert_type: row::parsed(row, 1)?,
            severity: row::parsed(row, 2)?,
            user_id: row.get(3)?,
            task_id: row::parsed(row, 4)?,
            description: row.get(5)?,
            timestamp: row.get(6)?,
            resolved: row.get::<_, i32>(7)? != 0,
            resolved_by: row.get(8)?,
            resolved_at: row.get(9)?,
        })
    }

    pub fn insert(&self, alert: &FraudAlert) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO fraud_alerts ({ALERT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                alert.id.as_str(),
                alert.alert_type.as_str(),
                alert.severity.as_str(),
                alert.user_id,
                alert.task_id.as_str(),
                alert.description,
                alert.timestamp,
                i32::from(alert.resolved),
                alert.resolved_by,
                alert.resolved_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &AlertId) -> Result<Option<FraudAlert>> {
        let alert = self
            .conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM fraud_alerts WHERE id = ?"),
                params![id.as_str()],
                Self::parse_alert,
            )
            .optional()?;
        Ok(alert)
    }

    /// Alerts newest first
    pub fn list(&self, include_resolved: bool) -> Result<Vec<FraudAlert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS}
             FROM fraud_alerts
             WHERE ?1 OR resolved = 0
             ORDER BY timestamp DESC, id DESC"
        ))?;
        let alerts = stmt
            .query_map(params![include_resolved], Self::parse_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }

    /// Highest severity among open alerts for the same user and task
    pub fn open_severity_for(&self, user_id: &str, task_id: &TaskId) -> Result<Option<Severity>> {
        let mut stmt = self.conn.prepare(
            "SELECT severity FROM fraud_alerts
             WHERE user_id = ? AND task_id = ? AND resolved = 0",
        )?;
        let severities = stmt
            .query_map(params![user_id, task_id.as_str()], |row| {
                row::parsed::<Severity>(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(severities.into_iter().max())
    }

    /// Set the resolution fields; returns false when the alert was already resolved
    pub fn resolve(&self, id: &AlertId, resolved_by: &str, resolved_at: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE fraud_alerts SET resolved = 1, resolved_by = ?, resolved_at = ?
             WHERE id = ? AND resolved = 0",
            params![resolved_by, resolved_at, id.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Returns `(total, unresolved)`
    pub fn counts(&self) -> Result<(usize, usize)> {
        let (total, unresolved): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN resolved = 0 THEN 1 ELSE 0 END), 0)
             FROM fraud_alerts",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((
            usize::try_from(total).unwrap_or_default(),
            usize::try_from(unresolved).unwrap_or_default(),
        ))
    }

    /// Users with more than one open alert, highest count first
    pub fn suspicious_users(&self) -> Result<Vec<SuspiciousUser>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, COUNT(*) AS alert_count
             FROM fraud_alerts
             WHERE resolved = 0
             GROUP BY user_id
             HAVING alert_count > 1
             ORDER BY alert_count DESC, user_id ASC",
        )?;
        let users = stmt
            .query_map([], |row| {
                Ok(SuspiciousUser {
                    user_id: row.get(0)?,
                    alert_count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }
}
