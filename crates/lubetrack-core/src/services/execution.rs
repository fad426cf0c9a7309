//! Completion pipeline shared by every client.
//!
//! Phase 1 runs synchronously against local state: evidence screening, the
//! quality gate, the ledger write and the fraud detectors. Phase 2 is a nudge
//! to the sync engine, which pushes the new queue entry in the background.

use std::collections::HashSet;

use crate::config::{AppConfig, FraudConfig};
use crate::db::SharedDatabase;
use crate::error::{Error, Result};
use crate::evidence::{EvidenceRegistry, Screening};
use crate::fraud::{evaluate, CompletionSignal, FraudAlertManager};
use crate::ledger::{CompletionCheck, CompletionInput, IssueInput, Ledger};
use crate::models::{
    AlertType, GeoPoint, PhotoKind, PhotoRecord, PhotoRef, Quantity, Severity, TaskExecution,
    TaskId,
};
use crate::quality::QualityGate;
use crate::sync::{RemoteAuthority, SyncEngine};
use crate::util::{normalize_text_option, now_ms};

/// A captured photo as it arrives from the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidencePhoto {
    pub kind: PhotoKind,
    pub bytes: Vec<u8>,
}

impl EvidencePhoto {
    pub fn new(kind: PhotoKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }
}

/// Everything the technician submits to close a task
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub task_id: TaskId,
    pub user_id: String,
    pub quantity: Quantity,
    pub observations: Option<String>,
    pub photos: Vec<EvidencePhoto>,
    /// Operator acknowledged a soft quantity warning
    pub confirm_deviation: bool,
    /// Device position at completion time
    pub location: Option<GeoPoint>,
}

/// A problem reported instead of a completion
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub task_id: TaskId,
    pub user_id: String,
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub photos: Vec<EvidencePhoto>,
}

/// Screened photos of one request, not yet registered
struct ScreenedEvidence {
    refs: Vec<PhotoRef>,
    fresh: Vec<(PhotoRecord, Vec<u8>)>,
    duplicate: Option<(PhotoKind, PhotoRecord)>,
}

/// Orchestrates registry, gate, ledger and detectors, then wakes the sync engine
pub struct ExecutionService<R> {
    ledger: Ledger,
    evidence: EvidenceRegistry,
    fraud: FraudAlertManager,
    engine: SyncEngine<R>,
    detectors: FraudConfig,
}

impl<R> Clone for ExecutionService<R> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            evidence: self.evidence.clone(),
            fraud: self.fraud.clone(),
            engine: self.engine.clone(),
            detectors: self.detectors,
        }
    }
}

impl<R: RemoteAuthority> ExecutionService<R> {
    pub const fn new(
        ledger: Ledger,
        evidence: EvidenceRegistry,
        fraud: FraudAlertManager,
        engine: SyncEngine<R>,
        detectors: FraudConfig,
    ) -> Self {
        Self {
            ledger,
            evidence,
            fraud,
            engine,
            detectors,
        }
    }

    /// Wire every component over one database
    pub fn open(db: &SharedDatabase, config: &AppConfig, remote: R) -> Result<Self> {
        let ledger = Ledger::new(db.clone(), QualityGate::new(config.quality));
        let evidence = EvidenceRegistry::new(db.clone(), config.evidence);
        let engine = SyncEngine::new(
            ledger.clone(),
            evidence.clone(),
            remote,
            &config.sync,
            config.remote.push_timeout(),
        )?;
        Ok(Self::new(
            ledger,
            evidence,
            FraudAlertManager::new(db.clone()),
            engine,
            config.fraud,
        ))
    }

    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub const fn evidence(&self) -> &EvidenceRegistry {
        &self.evidence
    }

    pub const fn fraud(&self) -> &FraudAlertManager {
        &self.fraud
    }

    pub const fn engine(&self) -> &SyncEngine<R> {
        &self.engine
    }

    /// Record a completion.
    ///
    /// Reused evidence blocks the completion with `DuplicateEvidence` after
    /// raising one `duplicate_photo` alert. An identical retry of an accepted
    /// completion returns the stored task unchanged.
    pub fn record_completion(&self, request: CompletionRequest) -> Result<TaskExecution> {
        let CompletionRequest {
            task_id,
            user_id,
            quantity,
            observations,
            photos,
            confirm_deviation,
            location,
        } = request;
        let user_id = required_field(user_id, "user_id")?;

        let screened = self.screen_photos(&task_id, &user_id, &photos)?;
        let task = match self.ledger.check_completion(
            &task_id,
            &quantity,
            observations.as_deref(),
            &screened.refs,
        )? {
            CompletionCheck::AlreadyRecorded(task) => return Ok(task),
            CompletionCheck::Ready(task) => task,
        };
        self.reject_duplicate(&task_id, &user_id, screened.duplicate.as_ref())?;

        self.ledger
            .gate()
            .check(&quantity, task.expected_quantity.as_ref())
            .enforce(confirm_deviation)?;

        self.register_fresh(&screened.fresh)?;
        let completed = self.ledger.record_completion(
            &task_id,
            CompletionInput {
                quantity_used: quantity,
                observations,
                photo_refs: screened.refs,
                executed_by: user_id.clone(),
                deviation_confirmed: confirm_deviation,
            },
        )?;

        self.run_detectors(&completed, &user_id, location);
        self.after_local_commit();
        Ok(completed)
    }

    /// Report a problem on a pending task; creates an incident
    pub fn record_issue(&self, request: IssueRequest) -> Result<TaskExecution> {
        let IssueRequest {
            task_id,
            user_id,
            issue_type,
            severity,
            description,
            photos,
        } = request;
        // nothing is screened or registered for a report that cannot be stored
        let user_id = required_field(user_id, "user_id")?;
        let issue_type = required_field(issue_type, "issue_type")?;
        let description = required_field(description, "description")?;

        let task = self.ledger.get_task(&task_id).map_err(|error| match error {
            Error::NotFound(_) => Error::invalid_transition(task_id, "task does not exist"),
            other => other,
        })?;
        if task.status.is_terminal() {
            return Err(Error::invalid_transition(
                task_id,
                format!("task is already {}", task.status),
            ));
        }

        let screened = self.screen_photos(&task_id, &user_id, &photos)?;
        self.reject_duplicate(&task_id, &user_id, screened.duplicate.as_ref())?;
        self.register_fresh(&screened.fresh)?;

        let reported = self.ledger.record_issue(
            &task_id,
            IssueInput {
                issue_type,
                severity,
                description,
                photo_refs: screened.refs,
                reported_by: user_id,
            },
        )?;
        self.after_local_commit();
        Ok(reported)
    }

    pub fn skip_task(&self, task_id: &TaskId, reason: Option<String>) -> Result<TaskExecution> {
        let skipped = self.ledger.skip_task(task_id, reason)?;
        self.after_local_commit();
        Ok(skipped)
    }

    pub fn amend_observations(
        &self,
        task_id: &TaskId,
        observations: Option<String>,
    ) -> Result<TaskExecution> {
        let amended = self.ledger.amend_observations(task_id, observations)?;
        self.after_local_commit();
        Ok(amended)
    }

    fn screen_photos(
        &self,
        task_id: &TaskId,
        user_id: &str,
        photos: &[EvidencePhoto],
    ) -> Result<ScreenedEvidence> {
        let mut screened = ScreenedEvidence {
            refs: Vec::with_capacity(photos.len()),
            fresh: Vec::new(),
            duplicate: None,
        };
        let mut seen = HashSet::new();

        for photo in photos {
            let screening = self.evidence.screen(&photo.bytes, task_id, photo.kind)?;
            if let Some(hash) = screening.hash() {
                if !seen.insert(hash.clone()) {
                    return Err(Error::InvalidInput(format!(
                        "the same photo was attached twice to task {task_id}"
                    )));
                }
            }
            screened.refs.push(PhotoRef {
                kind: photo.kind,
                hash: screening.hash().cloned(),
            });

            match screening {
                Screening::Fresh(hash) => screened.fresh.push((
                    PhotoRecord::new(hash, *task_id, user_id, photo.kind),
                    photo.bytes.clone(),
                )),
                Screening::Duplicate { original, .. } if screened.duplicate.is_none() => {
                    screened.duplicate = Some((photo.kind, original));
                }
                Screening::Duplicate { .. } | Screening::Resubmitted(_) | Screening::Unhashed => {}
            }
        }
        Ok(screened)
    }

    fn reject_duplicate(
        &self,
        task_id: &TaskId,
        user_id: &str,
        duplicate: Option<&(PhotoKind, PhotoRecord)>,
    ) -> Result<()> {
        let Some((kind, original)) = duplicate else {
            return Ok(());
        };

        let alert = self.fraud.create_alert(
            AlertType::DuplicatePhoto,
            user_id,
            task_id,
            format!(
                "{kind} photo for task {task_id} matches the {} photo submitted by {} for task {} at {}",
                original.kind, original.user_id, original.task_id, original.timestamp
            ),
        )?;
        Err(Error::DuplicateEvidence {
            original_task_id: original.task_id.to_string(),
            original_timestamp: original.timestamp,
            alert_id: alert.id.to_string(),
        })
    }

    fn register_fresh(&self, fresh: &[(PhotoRecord, Vec<u8>)]) -> Result<()> {
        for (record, bytes) in fresh {
            self.evidence.register_with_bytes(record, bytes)?;
        }
        Ok(())
    }

    /// Detector failures never undo an accepted completion
    fn run_detectors(&self, task: &TaskExecution, user_id: &str, location: Option<GeoPoint>) {
        let previous_completion = match self.ledger.last_completion_by(user_id, &task.id) {
            Ok(previous) => previous,
            Err(error) => {
                tracing::warn!("Skipping fraud heuristics for task {}: {error}", task.id);
                return;
            }
        };
        let signal = CompletionSignal {
            completed_at: task.completed_at.unwrap_or_else(now_ms),
            previous_completion,
            reported_location: location,
            point_location: task.point_location,
        };

        let findings = evaluate(&self.detectors, &signal);
        if findings.is_empty() {
            return;
        }
        if let Err(error) = self.fraud.raise_findings(user_id, &task.id, findings) {
            tracing::error!("Failed to raise fraud alerts for task {}: {error}", task.id);
        }
    }

    fn after_local_commit(&self) {
        if let Err(error) = self.engine.refresh_pending_count() {
            tracing::warn!("Failed to refresh pending count: {error}");
        }
        self.engine.request_sync();
    }
}

fn required_field(value: String, field: &str) -> Result<String> {
    normalize_text_option(Some(value))
        .ok_or_else(|| Error::InvalidInput(format!("{field} must not be empty")))
}
