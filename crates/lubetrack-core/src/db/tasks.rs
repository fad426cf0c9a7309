//! Task execution repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{GeoPoint, SyncState, TaskExecution, TaskId, TaskStatus};
use rusqlite::{params, Connection, OptionalExtension};

use super::row;

const TASK_COLUMNS: &str = "id, work_order_id, lubrication_point_id, status,
    expected_amount, expected_unit, point_latitude, point_longitude,
    quantity_amount, quantity_unit, photo_refs, observations, issue,
    completed_at, executed_by, sync_state, created_at, updated_at, last_synced_at";

/// Optional filters for listing tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub sync_state: Option<SyncState>,
}

/// Trait for task storage operations
pub trait TaskRepository {
    /// Insert a new task row
    fn insert(&self, task: &TaskExecution) -> Result<()>;

    /// Get a task by ID
    fn get(&self, id: &TaskId) -> Result<Option<TaskExecution>>;

    /// List tasks, most recently updated first
    fn list(&self, filter: TaskFilter, limit: usize) -> Result<Vec<TaskExecution>>;

    /// Persist every mutable field of an existing task
    fn save(&self, task: &TaskExecution) -> Result<()>;

    /// Update only the replication state
    fn set_sync_state(&self, id: &TaskId, state: SyncState) -> Result<()>;

    /// Mark a task acknowledged by the remote at `synced_at`
    fn mark_synced(&self, id: &TaskId, synced_at: i64) -> Result<()>;

    /// Latest completion time by `user_id` on any task other than `exclude`
    fn last_completion_by(&self, user_id: &str, exclude: &TaskId) -> Result<Option<i64>>;
}

/// `SQLite` implementation of `TaskRepository`
pub struct SqliteTaskRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a task from a database row
    fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskExecution> {
        let latitude: Option<f64> = row.get(6)?;
        let longitude: Option<f64> = row.get(7)?;
        Ok(TaskExecution {
            id: row::parsed(row, 0)?,
            work_order_id: row.get(1)?,
            lubrication_point_id: row.get(2)?,
            status: row::parsed(row, 3)?,
            expected_quantity: row::quantity(row, 4)?,
            point_location: latitude
                .zip(longitude)
                .map(|(lat, lon)| GeoPoint::new(lat, lon)),
            quantity_used: row::quantity(row, 8)?,
            photo_refs: row::json(row, 10)?,
            observations: row.get(11)?,
            issue: row::json_opt(row, 12)?,
            completed_at: row.get(13)?,
            executed_by: row.get(14)?,
            sync_state: row::parsed(row, 15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
            last_synced_at: row.get(18)?,
        })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn insert(&self, task: &TaskExecution) -> Result<()> {
        let photo_refs = serde_json::to_string(&task.photo_refs)?;
        let issue = task.issue.as_ref().map(serde_json::to_string).transpose()?;

        self.conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                task.id.as_str(),
                task.work_order_id,
                task.lubrication_point_id,
                task.status.as_str(),
                task.expected_quantity.map(|q| q.amount),
                task.expected_quantity.map(|q| q.unit.as_str()),
                task.point_location.map(|p| p.latitude),
                task.point_location.map(|p| p.longitude),
                task.quantity_used.map(|q| q.amount),
                task.quantity_used.map(|q| q.unit.as_str()),
                photo_refs,
                task.observations,
                issue,
                task.completed_at,
                task.executed_by,
                task.sync_state.as_str(),
                task.created_at,
                task.updated_at,
                task.last_synced_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<TaskExecution>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                params![id.as_str()],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    fn list(&self, filter: TaskFilter, limit: usize) -> Result<Vec<TaskExecution>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS}
             FROM tasks
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR sync_state = ?2)
             ORDER BY updated_at DESC, id DESC
             LIMIT ?3"
        ))?;

        let tasks = stmt
            .query_map(
                params![
                    filter.status.map(TaskStatus::as_str),
                    filter.sync_state.map(SyncState::as_str),
                    limit as i64
                ],
                Self::parse_task,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tasks)
    }

    fn save(&self, task: &TaskExecution) -> Result<()> {
        let photo_refs = serde_json::to_string(&task.photo_refs)?;
        let issue = task.issue.as_ref().map(serde_json::to_string).transpose()?;

        let rows = self.conn.execute(
            "UPDATE tasks SET
                status = ?, quantity_amount = ?, quantity_unit = ?, photo_refs = ?,
                observations = ?, issue = ?, completed_at = ?, executed_by = ?,
                sync_state = ?, updated_at = ?
             WHERE id = ?",
            params![
                task.status.as_str(),
                task.quantity_used.map(|q| q.amount),
                task.quantity_used.map(|q| q.unit.as_str()),
                photo_refs,
                task.observations,
                issue,
                task.completed_at,
                task.executed_by,
                task.sync_state.as_str(),
                task.updated_at,
                task.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(crate::Error::NotFound(task.id.to_string()));
        }
        Ok(())
    }

    fn set_sync_state(&self, id: &TaskId, state: SyncState) -> Result<()> {
        self.conn.execute(
            "UPDATE tasks SET sync_state = ? WHERE id = ?",
            params![state.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    fn mark_synced(&self, id: &TaskId, synced_at: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE tasks SET sync_state = 'synced', last_synced_at = ? WHERE id = ?",
            params![synced_at, id.as_str()],
        )?;
        Ok(())
    }

    fn last_completion_by(&self, user_id: &str, exclude: &TaskId) -> Result<Option<i64>> {
        let latest: Option<i64> = self.conn.query_row(
            "SELECT MAX(completed_at) FROM tasks
             WHERE executed_by = ? AND status = 'completed' AND id != ?",
            params![user_id, exclude.as_str()],
            |row| row.get(0),
        )?;
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{PhotoKind, PhotoRef, Quantity, Unit};

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn pending_task() -> TaskExecution {
        TaskExecution {
            id: TaskId::new(),
            work_order_id: "wo-1".to_string(),
            lubrication_point_id: "lp-7".to_string(),
            status: TaskStatus::Pending,
            expected_quantity: Some(Quantity::new(100.0, Unit::G)),
            point_location: Some(GeoPoint::new(-33.45, -70.66)),
            quantity_used: None,
            photo_refs: Vec::new(),
            observations: None,
            issue: None,
            completed_at: None,
            executed_by: None,
            sync_state: SyncState::LocalOnly,
            created_at: 1,
            updated_at: 1,
            last_synced_at: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let task = pending_task();
        repo.insert(&task).unwrap();

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
        assert!(repo.get(&TaskId::new()).unwrap().is_none());
    }

    #[test]
    fn test_save_persists_completion_fields() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let mut task = pending_task();
        repo.insert(&task).unwrap();

        task.status = TaskStatus::Completed;
        task.quantity_used = Some(Quantity::new(95.0, Unit::G));
        task.photo_refs = vec![PhotoRef {
            kind: PhotoKind::After,
            hash: None,
        }];
        task.completed_at = Some(10);
        task.executed_by = Some("tech-1".to_string());
        task.updated_at = 10;
        repo.save(&task).unwrap();

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
    }

    #[test]
    fn test_list_filters_by_status() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let pending = pending_task();
        let mut done = pending_task();
        done.status = TaskStatus::Completed;
        repo.insert(&pending).unwrap();
        repo.insert(&done).unwrap();

        let filter = TaskFilter {
            status: Some(TaskStatus::Pending),
            ..TaskFilter::default()
        };
        let tasks = repo.list(filter, 10).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, pending.id);

        assert_eq!(repo.list(TaskFilter::default(), 10).unwrap().len(), 2);
    }

    #[test]
    fn test_last_completion_by_excludes_current_task() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let mut first = pending_task();
        first.status = TaskStatus::Completed;
        first.executed_by = Some("tech-1".to_string());
        first.completed_at = Some(1_000);
        repo.insert(&first).unwrap();

        let current = pending_task();
        repo.insert(&current).unwrap();

        assert_eq!(
            repo.last_completion_by("tech-1", &current.id).unwrap(),
            Some(1_000)
        );
        assert_eq!(repo.last_completion_by("tech-1", &first.id).unwrap(), None);
        assert_eq!(repo.last_completion_by("tech-2", &current.id).unwrap(), None);
    }
}
