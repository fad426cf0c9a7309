//! Local execution ledger.
//!
//! The durable, single-writer record of task state on the device. Every
//! mutation is written together with its sync queue entry in one SQLite
//! transaction, so a completion is accepted with zero connectivity and is
//! never lost between the local write and the remote push.
//!
//! The sync engine only reaches the ledger through the narrow `mark_*` /
//! `acknowledge` / `record_*` methods at the bottom of [`Ledger`], which touch
//! queue rows and `sync_state` and nothing else.

mod incidents;

pub use incidents::{IncidentRecorder, LocalIncidentRecorder};

use std::sync::Arc;

use rusqlite::Connection;

use crate::db::{
    SharedDatabase, SqliteIncidentRepository, SqliteQueueRepository, SqliteTaskRepository,
    TaskFilter, TaskRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    Incident, IncidentReport, IssueDetails, NewTask, PhotoRef, Quantity, QueueState, Severity,
    SyncOperation, SyncQueueEntry, SyncState, TaskDelta, TaskExecution, TaskId, TaskStatus,
};
use crate::quality::QualityGate;
use crate::util::{normalize_text_option, now_ms};

/// A technician's completion report
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionInput {
    pub quantity_used: Quantity,
    pub observations: Option<String>,
    pub photo_refs: Vec<PhotoRef>,
    pub executed_by: String,
    /// Operator acknowledged a soft quantity warning
    pub deviation_confirmed: bool,
}

/// A problem reported in place of a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueInput {
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub photo_refs: Vec<PhotoRef>,
    pub reported_by: String,
}

/// Result of checking a completion before any side effects run
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionCheck {
    /// The task is already completed with exactly this payload
    AlreadyRecorded(TaskExecution),
    /// The task is pending and may be completed
    Ready(TaskExecution),
}

/// Handle to the ledger; cheap to clone
#[derive(Clone)]
pub struct Ledger {
    db: SharedDatabase,
    incidents: Arc<dyn IncidentRecorder>,
    gate: QualityGate,
}

impl Ledger {
    /// Create a ledger that stores incidents in the same database
    pub fn new(db: SharedDatabase, gate: QualityGate) -> Self {
        let incidents = Arc::new(LocalIncidentRecorder);
        Self {
            db,
            incidents,
            gate,
        }
    }

    /// Replace the incident collaborator
    #[must_use]
    pub fn with_incident_recorder(mut self, recorder: Arc<dyn IncidentRecorder>) -> Self {
        self.incidents = recorder;
        self
    }

    pub const fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Insert a pending task handed over by work order planning
    pub fn schedule_task(&self, new_task: NewTask) -> Result<TaskExecution> {
        let work_order_id = required_text(new_task.work_order_id, "work_order_id")?;
        let lubrication_point_id =
            required_text(new_task.lubrication_point_id, "lubrication_point_id")?;
        if let Some(expected) = new_task.expected_quantity {
            if !expected.amount.is_finite() || expected.amount < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "expected quantity must be a non-negative number, got {}",
                    expected.amount
                )));
            }
        }

        let now = now_ms();
        let task = TaskExecution {
            id: TaskId::new(),
            work_order_id,
            lubrication_point_id,
            status: TaskStatus::Pending,
            expected_quantity: new_task.expected_quantity,
            point_location: new_task.point_location,
            quantity_used: None,
            photo_refs: Vec::new(),
            observations: None,
            issue: None,
            completed_at: None,
            executed_by: None,
            sync_state: SyncState::LocalOnly,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
        };
        self.db
            .with(|conn| SqliteTaskRepository::new(conn).insert(&task))?;
        tracing::debug!(
            "Scheduled task {} for point {}",
            task.id,
            task.lubrication_point_id
        );
        Ok(task)
    }

    /// Check whether a completion would be a no-op, an error, or a new write
    pub fn check_completion(
        &self,
        task_id: &TaskId,
        quantity_used: &Quantity,
        observations: Option<&str>,
        photo_refs: &[PhotoRef],
    ) -> Result<CompletionCheck> {
        let observations = normalize_text_option(observations.map(str::to_string));
        let task = self
            .db
            .with(|conn| SqliteTaskRepository::new(conn).get(task_id))?;
        classify_completion(
            task,
            task_id,
            quantity_used,
            observations.as_deref(),
            photo_refs,
        )
    }

    /// Record a completion and enqueue it for sync.
    ///
    /// Repeating an identical completion returns the stored task without
    /// enqueueing anything.
    pub fn record_completion(
        &self,
        task_id: &TaskId,
        input: CompletionInput,
    ) -> Result<TaskExecution> {
        let CompletionInput {
            quantity_used,
            observations,
            photo_refs,
            executed_by,
            deviation_confirmed,
        } = input;
        let observations = normalize_text_option(observations);
        let executed_by = required_text(executed_by, "executed_by")?;

        self.db.transaction(|conn| {
            let tasks = SqliteTaskRepository::new(conn);
            let check = classify_completion(
                tasks.get(task_id)?,
                task_id,
                &quantity_used,
                observations.as_deref(),
                &photo_refs,
            )?;
            let mut task = match check {
                CompletionCheck::AlreadyRecorded(task) => {
                    tracing::debug!("Completion of task {task_id} already recorded");
                    return Ok(task);
                }
                CompletionCheck::Ready(task) => task,
            };

            self.gate
                .check(&quantity_used, task.expected_quantity.as_ref())
                .enforce(deviation_confirmed)?;

            let now = now_ms();
            task.status = TaskStatus::Completed;
            task.quantity_used = Some(quantity_used);
            task.observations = observations;
            task.photo_refs = photo_refs;
            task.completed_at = Some(now);
            task.executed_by = Some(executed_by);
            commit_mutation(conn, &mut task, now)?;

            tracing::info!("Recorded completion of task {} ({quantity_used})", task.id);
            Ok(task)
        })
    }

    /// Report a problem instead of completing; always creates an incident
    pub fn record_issue(&self, task_id: &TaskId, input: IssueInput) -> Result<TaskExecution> {
        let IssueInput {
            issue_type,
            severity,
            description,
            photo_refs,
            reported_by,
        } = input;
        let issue_type = required_text(issue_type, "issue_type")?;
        let description = required_text(description, "description")?;
        let reported_by = required_text(reported_by, "reported_by")?;

        self.db.transaction(|conn| {
            let tasks = SqliteTaskRepository::new(conn);
            let mut task = require_pending(tasks.get(task_id)?, task_id)?;

            let report = IncidentReport {
                task_id: *task_id,
                issue_type: issue_type.clone(),
                severity,
                description: description.clone(),
                reported_by: reported_by.clone(),
            };
            let incident_id = self.incidents.create_incident(conn, &report)?;

            let now = now_ms();
            task.status = TaskStatus::IssueReported;
            task.photo_refs = photo_refs;
            task.issue = Some(IssueDetails {
                issue_type,
                severity,
                description,
                incident_id: Some(incident_id),
            });
            task.completed_at = Some(now);
            task.executed_by = Some(reported_by);
            commit_mutation(conn, &mut task, now)?;

            tracing::info!("Recorded issue on task {}", task.id);
            Ok(task)
        })
    }

    /// Close a pending task without executing it
    pub fn skip_task(&self, task_id: &TaskId, reason: Option<String>) -> Result<TaskExecution> {
        let reason = normalize_text_option(reason);
        self.db.transaction(|conn| {
            let tasks = SqliteTaskRepository::new(conn);
            let mut task = require_pending(tasks.get(task_id)?, task_id)?;

            let now = now_ms();
            task.status = TaskStatus::Skipped;
            task.observations = reason;
            commit_mutation(conn, &mut task, now)?;
            Ok(task)
        })
    }

    /// Replace the observations of a closed task.
    ///
    /// This is the only mutation allowed after a terminal transition; it
    /// resets `sync_state` and enqueues an update like any other write.
    pub fn amend_observations(
        &self,
        task_id: &TaskId,
        observations: Option<String>,
    ) -> Result<TaskExecution> {
        let observations = normalize_text_option(observations);
        self.db.transaction(|conn| {
            let tasks = SqliteTaskRepository::new(conn);
            let mut task = tasks
                .get(task_id)?
                .ok_or_else(|| Error::invalid_transition(task_id, "task does not exist"))?;
            if !task.status.is_terminal() {
                return Err(Error::invalid_transition(
                    task_id,
                    "observations of a pending task are recorded with its completion",
                ));
            }
            if task.observations == observations {
                return Ok(task);
            }

            task.observations = observations;
            commit_mutation(conn, &mut task, now_ms())?;
            Ok(task)
        })
    }

    pub fn get_task(&self, task_id: &TaskId) -> Result<TaskExecution> {
        self.db
            .with(|conn| SqliteTaskRepository::new(conn).get(task_id))?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    pub fn list_tasks(&self, filter: TaskFilter, limit: usize) -> Result<Vec<TaskExecution>> {
        self.db
            .with(|conn| SqliteTaskRepository::new(conn).list(filter, limit))
    }

    pub fn list_incidents(&self, task_id: &TaskId) -> Result<Vec<Incident>> {
        self.db
            .with(|conn| SqliteIncidentRepository::new(conn).list_for_task(task_id))
    }

    /// Every unacknowledged queue entry in enqueue order
    pub fn list_queue(&self) -> Result<Vec<SyncQueueEntry>> {
        self.db
            .with(|conn| SqliteQueueRepository::new(conn).list())
    }

    /// Number of queue entries not yet acknowledged, parked conflicts included
    pub fn get_pending_count(&self) -> Result<usize> {
        self.db
            .with(|conn| SqliteQueueRepository::new(conn).count())
    }

    /// Latest completion by `user_id` on a task other than `exclude`
    pub fn last_completion_by(&self, user_id: &str, exclude: &TaskId) -> Result<Option<i64>> {
        self.db.with(|conn| {
            SqliteTaskRepository::new(conn).last_completion_by(user_id, exclude)
        })
    }

    // Sync-facing operations

    /// Queued entries the engine may push, FIFO, skipping tasks blocked by a conflict
    pub fn drainable_entries(&self) -> Result<Vec<SyncQueueEntry>> {
        self.db
            .with(|conn| SqliteQueueRepository::new(conn).drainable())
    }

    pub fn mark_in_flight(&self, entry: &SyncQueueEntry) -> Result<()> {
        self.db.transaction(|conn| {
            SqliteQueueRepository::new(conn)
                .set_state(entry.seq, QueueState::InFlight)?;
            SqliteTaskRepository::new(conn).set_sync_state(&entry.task_id, SyncState::Syncing)
        })
    }

    /// Return one in-flight entry to the queue when its push was abandoned
    pub fn release_in_flight(&self, entry: &SyncQueueEntry) -> Result<()> {
        self.db.transaction(|conn| {
            SqliteQueueRepository::new(conn).release(entry.seq)?;
            SqliteTaskRepository::new(conn).set_sync_state(&entry.task_id, SyncState::LocalOnly)
        })
    }

    /// Remove an acknowledged entry and return the task's resulting sync state.
    ///
    /// The task only becomes `synced` when no later entry is waiting for it.
    pub fn acknowledge(&self, entry: &SyncQueueEntry, acknowledged_at: i64) -> Result<SyncState> {
        self.db.transaction(|conn| {
            let queue = SqliteQueueRepository::new(conn);
            let tasks = SqliteTaskRepository::new(conn);
            queue.delete(entry.seq)?;

            if queue.count_for_task(&entry.task_id)? == 0 {
                tasks.mark_synced(&entry.task_id, acknowledged_at)?;
                Ok(SyncState::Synced)
            } else {
                tasks.set_sync_state(&entry.task_id, SyncState::LocalOnly)?;
                Ok(SyncState::LocalOnly)
            }
        })
    }

    /// Keep an entry queued after a transient failure; returns the new retry count
    pub fn record_transient_failure(
        &self,
        entry: &SyncQueueEntry,
        error: &str,
        next_attempt_at: i64,
    ) -> Result<u32> {
        let retry_count = entry.retry_count.saturating_add(1);
        self.db.transaction(|conn| {
            SqliteQueueRepository::new(conn).record_failure(
                entry.seq,
                error,
                retry_count,
                next_attempt_at,
            )?;
            SqliteTaskRepository::new(conn).set_sync_state(&entry.task_id, SyncState::LocalOnly)
        })?;
        Ok(retry_count)
    }

    /// Park an entry for manual review and flag its task
    pub fn mark_conflict(&self, entry: &SyncQueueEntry, error: &str) -> Result<()> {
        self.db.transaction(|conn| {
            SqliteQueueRepository::new(conn).park(entry.seq, error)?;
            SqliteTaskRepository::new(conn).set_sync_state(&entry.task_id, SyncState::Conflict)
        })
    }

    /// Return every in-flight entry to the queue; run when a drain is
    /// cancelled and when the queue owner starts.
    pub fn requeue_in_flight(&self) -> Result<usize> {
        let requeued = self.db.transaction(|conn| {
            let task_ids = SqliteQueueRepository::new(conn).requeue_in_flight()?;
            let tasks = SqliteTaskRepository::new(conn);
            for task_id in &task_ids {
                tasks.set_sync_state(task_id, SyncState::LocalOnly)?;
            }
            Ok(task_ids.len())
        })?;
        if requeued > 0 {
            tracing::info!("Requeued in-flight entries for {requeued} task(s)");
        }
        Ok(requeued)
    }

    /// Release a task's parked entries back into the queue after manual review
    pub fn retry_conflicts(&self, task_id: &TaskId) -> Result<usize> {
        self.db.transaction(|conn| {
            let tasks = SqliteTaskRepository::new(conn);
            if tasks.get(task_id)?.is_none() {
                return Err(Error::NotFound(format!("task {task_id}")));
            }
            let released = SqliteQueueRepository::new(conn).release_conflicts(task_id)?;
            if released > 0 {
                tasks.set_sync_state(task_id, SyncState::LocalOnly)?;
                tracing::info!("Released {released} parked entr(ies) for task {task_id}");
            }
            Ok(released)
        })
    }
}

fn required_text(value: String, field: &str) -> Result<String> {
    normalize_text_option(Some(value))
        .ok_or_else(|| Error::InvalidInput(format!("{field} must not be empty")))
}

fn require_pending(task: Option<TaskExecution>, task_id: &TaskId) -> Result<TaskExecution> {
    let task = task.ok_or_else(|| Error::invalid_transition(task_id, "task does not exist"))?;
    if task.status.is_terminal() {
        return Err(Error::invalid_transition(
            task_id,
            format!("task is already {}", task.status),
        ));
    }
    Ok(task)
}

fn classify_completion(
    task: Option<TaskExecution>,
    task_id: &TaskId,
    quantity_used: &Quantity,
    observations: Option<&str>,
    photo_refs: &[PhotoRef],
) -> Result<CompletionCheck> {
    match task {
        Some(task) if task.matches_completion(quantity_used, observations, photo_refs) => {
            Ok(CompletionCheck::AlreadyRecorded(task))
        }
        other => require_pending(other, task_id).map(CompletionCheck::Ready),
    }
}

/// Persist `task` as a fresh local mutation and enqueue it.
///
/// The entry is an `update` once the remote has seen the task or an earlier
/// entry for it is still pending. A parked conflict keeps the task in
/// `conflict` until it is released.
fn commit_mutation(conn: &Connection, task: &mut TaskExecution, now: i64) -> Result<i64> {
    let queue = SqliteQueueRepository::new(conn);
    task.sync_state = if queue.has_conflict(&task.id)? {
        SyncState::Conflict
    } else {
        SyncState::LocalOnly
    };
    task.updated_at = now;
    SqliteTaskRepository::new(conn).save(task)?;

    let operation = if task.last_synced_at.is_some() || queue.count_for_task(&task.id)? > 0 {
        SyncOperation::Update
    } else {
        SyncOperation::Create
    };
    queue.enqueue(operation, &TaskDelta::from(&*task), now)
}
