//! Fraud alert manager.
//!
//! Turns detector findings into reviewable alerts. Severity is fixed by
//! policy from the alert type; a `suspicious_time` alert that lands on a
//! user and task that already have an open alert is escalated. Alerts are
//! immutable apart from a single resolution by a reviewer.

mod heuristics;

pub use heuristics::{evaluate, CompletionSignal, Finding};

use crate::db::{SharedDatabase, SqliteAlertRepository, SqlitePhotoRepository};
use crate::error::{Error, Result};
use crate::models::{AlertId, AlertSummary, AlertType, FraudAlert, Severity, TaskId};
use crate::util::{normalize_text_option, now_ms, start_of_day_ms};

#[derive(Clone)]
pub struct FraudAlertManager {
    db: SharedDatabase,
}

impl FraudAlertManager {
    pub const fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Raise a new unresolved alert
    pub fn create_alert(
        &self,
        alert_type: AlertType,
        user_id: &str,
        task_id: &TaskId,
        description: impl Into<String>,
    ) -> Result<FraudAlert> {
        let user_id = normalize_text_option(Some(user_id.to_string()))
            .ok_or_else(|| Error::InvalidInput("user_id must not be empty".to_string()))?;
        let description = description.into();

        let alert = self.db.transaction(|conn| {
            let alerts = SqliteAlertRepository::new(conn);
            let severity = match alert_type {
                AlertType::SuspiciousTime => alerts
                    .open_severity_for(&user_id, task_id)?
                    .map_or(Severity::Low, compounded_severity),
                other => other.base_severity(),
            };

            let alert = FraudAlert {
                id: AlertId::new(),
                alert_type,
                severity,
                user_id,
                task_id: *task_id,
                description,
                timestamp: now_ms(),
                resolved: false,
                resolved_by: None,
                resolved_at: None,
            };
            alerts.insert(&alert)?;
            Ok(alert)
        })?;

        tracing::warn!(
            "Raised {} alert {} ({}) for user {} on task {}",
            alert.alert_type,
            alert.id,
            alert.severity,
            alert.user_id,
            alert.task_id
        );
        Ok(alert)
    }

    /// Raise one alert per finding, in order
    pub fn raise_findings(
        &self,
        user_id: &str,
        task_id: &TaskId,
        findings: Vec<Finding>,
    ) -> Result<Vec<FraudAlert>> {
        findings
            .into_iter()
            .map(|finding| {
                self.create_alert(finding.alert_type, user_id, task_id, finding.description)
            })
            .collect()
    }

    /// Alerts newest first; resolved ones only when asked for
    pub fn list_alerts(&self, include_resolved: bool) -> Result<Vec<FraudAlert>> {
        self.db
            .with(|conn| SqliteAlertRepository::new(conn).list(include_resolved))
    }

    pub fn get(&self, alert_id: &AlertId) -> Result<FraudAlert> {
        self.db
            .with(|conn| SqliteAlertRepository::new(conn).get(alert_id))?
            .ok_or_else(|| Error::NotFound(format!("alert {alert_id}")))
    }

    /// Mark an alert reviewed. Resolution happens exactly once.
    pub fn resolve(&self, alert_id: &AlertId, resolved_by: &str) -> Result<FraudAlert> {
        let resolved_by = normalize_text_option(Some(resolved_by.to_string()))
            .ok_or_else(|| Error::InvalidInput("resolved_by must not be empty".to_string()))?;

        let alert = self.db.transaction(|conn| {
            let alerts = SqliteAlertRepository::new(conn);
            let alert = alerts
                .get(alert_id)?
                .ok_or_else(|| Error::NotFound(format!("alert {alert_id}")))?;
            if alert.resolved || !alerts.resolve(alert_id, &resolved_by, now_ms())? {
                return Err(Error::AlreadyResolved(alert_id.to_string()));
            }
            alerts
                .get(alert_id)?
                .ok_or_else(|| Error::NotFound(format!("alert {alert_id}")))
        })?;

        tracing::info!("Alert {} resolved by {}", alert.id, resolved_by);
        Ok(alert)
    }

    /// Triage overview for the supervisor dashboard
    pub fn summarize(&self) -> Result<AlertSummary> {
        let since = start_of_day_ms(now_ms());
        self.db.with(|conn| {
            let alerts = SqliteAlertRepository::new(conn);
            let (total_alerts, unresolved_alerts) = alerts.counts()?;
            Ok(AlertSummary {
                total_alerts,
                unresolved_alerts,
                today_actions: SqlitePhotoRepository::new(conn).count_since(since)?,
                suspicious_users: alerts.suspicious_users()?,
            })
        })
    }
}

/// Severity of a `suspicious_time` alert that shares a user and task with an
/// open alert of `other` severity
fn compounded_severity(other: Severity) -> Severity {
    other.max(AlertType::SuspiciousTime.base_severity().raised())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhotoHash, PhotoKind, PhotoRecord, SuspiciousUser};
    use pretty_assertions::assert_eq;

    fn manager() -> FraudAlertManager {
        FraudAlertManager::new(SharedDatabase::open_in_memory().unwrap())
    }

    #[test]
    fn severity_follows_type_policy() {
        let manager = manager();
        let task = TaskId::new();
        let cases = [
            (AlertType::DuplicatePhoto, Severity::High),
            (AlertType::LocationMismatch, Severity::High),
            (AlertType::RapidCompletion, Severity::Medium),
        ];
        for (alert_type, expected) in cases {
            let alert = manager
                .create_alert(alert_type, "tech-1", &TaskId::new(), "finding")
                .unwrap();
            assert_eq!(alert.severity, expected);
            assert!(!alert.resolved);
        }

        let lone = manager
            .create_alert(AlertType::SuspiciousTime, "tech-1", &task, "late")
            .unwrap();
        assert_eq!(lone.severity, Severity::Low);
    }

    #[test]
    fn suspicious_time_escalates_when_compounded() {
        let manager = manager();
        let task = TaskId::new();

        manager
            .create_alert(AlertType::RapidCompletion, "tech-1", &task, "fast")
            .unwrap();
        let compounded = manager
            .create_alert(AlertType::SuspiciousTime, "tech-1", &task, "late")
            .unwrap();
        assert_eq!(compounded.severity, Severity::Medium);

        let other_task = TaskId::new();
        manager
            .create_alert(AlertType::DuplicatePhoto, "tech-1", &other_task, "reuse")
            .unwrap();
        let high = manager
            .create_alert(AlertType::SuspiciousTime, "tech-1", &other_task, "late")
            .unwrap();
        assert_eq!(high.severity, Severity::High);
    }

    #[test]
    fn compounding_with_low_alert_never_stays_low() {
        let manager = manager();
        let task = TaskId::new();
        manager
            .create_alert(AlertType::SuspiciousTime, "tech-1", &task, "late")
            .unwrap();
        let second = manager
            .create_alert(AlertType::SuspiciousTime, "tech-1", &task, "late again")
            .unwrap();
        assert_eq!(second.severity, Severity::Medium);
    }

    #[test]
    fn resolved_alerts_do_not_compound() {
        let manager = manager();
        let task = TaskId::new();
        let fast = manager
            .create_alert(AlertType::RapidCompletion, "tech-1", &task, "fast")
            .unwrap();
        manager.resolve(&fast.id, "supervisor").unwrap();

        let late = manager
            .create_alert(AlertType::SuspiciousTime, "tech-1", &task, "late")
            .unwrap();
        assert_eq!(late.severity, Severity::Low);
    }

    #[test]
    fn resolve_is_one_way() {
        let manager = manager();
        let alert = manager
            .create_alert(AlertType::DuplicatePhoto, "tech-1", &TaskId::new(), "reuse")
            .unwrap();

        let resolved = manager.resolve(&alert.id, "supervisor").unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("supervisor"));
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.description, alert.description);

        assert!(matches!(
            manager.resolve(&alert.id, "someone-else"),
            Err(Error::AlreadyResolved(_))
        ));
        assert_eq!(
            manager.get(&alert.id).unwrap().resolved_by.as_deref(),
            Some("supervisor")
        );
        assert!(matches!(
            manager.resolve(&AlertId::new(), "supervisor"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn list_excludes_resolved_by_default_and_is_newest_first() {
        let manager = manager();
        let first = manager
            .create_alert(AlertType::RapidCompletion, "a", &TaskId::new(), "1")
            .unwrap();
        let second = manager
            .create_alert(AlertType::RapidCompletion, "b", &TaskId::new(), "2")
            .unwrap();
        manager.resolve(&first.id, "sup").unwrap();

        let open = manager.list_alerts(false).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);

        let all = manager.list_alerts(true).unwrap();
        assert_eq!(
            all.iter().map(|alert| alert.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[test]
    fn summary_counts_alerts_users_and_today_actions() {
        let db = SharedDatabase::open_in_memory().unwrap();
        let manager = FraudAlertManager::new(db.clone());

        for _ in 0..3 {
            manager
                .create_alert(AlertType::RapidCompletion, "tech-2", &TaskId::new(), "fast")
                .unwrap();
        }
        for _ in 0..2 {
            manager
                .create_alert(AlertType::DuplicatePhoto, "tech-1", &TaskId::new(), "reuse")
                .unwrap();
        }
        let lone = manager
            .create_alert(AlertType::LocationMismatch, "tech-3", &TaskId::new(), "far")
            .unwrap();
        manager.resolve(&lone.id, "sup").unwrap();

        db.with(|conn| {
            SqlitePhotoRepository::new(conn).insert(&PhotoRecord::new(
                PhotoHash::new("h1"),
                TaskId::new(),
                "tech-1",
                PhotoKind::After,
            ))
        })
        .unwrap();

        let summary = manager.summarize().unwrap();
        assert_eq!(summary.total_alerts, 6);
        assert_eq!(summary.unresolved_alerts, 5);
        assert_eq!(summary.today_actions, 1);
        assert_eq!(
            summary.suspicious_users,
            vec![
                SuspiciousUser {
                    user_id: "tech-2".to_string(),
                    alert_count: 3
                },
                SuspiciousUser {
                    user_id: "tech-1".to_string(),
                    alert_count: 2
                },
            ]
        );
    }

    #[test]
    fn alerts_are_immutable_in_storage() {
        let db = SharedDatabase::open_in_memory().unwrap();
        let manager = FraudAlertManager::new(db.clone());
        let alert = manager
            .create_alert(AlertType::DuplicatePhoto, "tech-1", &TaskId::new(), "reuse")
            .unwrap();

        let tampered = db.with(|conn| {
            Ok(conn.execute(
                "UPDATE fraud_alerts SET severity = 'low' WHERE id = ?",
                [alert.id.as_str()],
            )?)
        });
        assert!(tampered.is_err());
    }
}
