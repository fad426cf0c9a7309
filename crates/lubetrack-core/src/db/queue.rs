//! Sync queue repository

use crate::error::Result;
use crate::models::{QueueState, SyncOperation, SyncQueueEntry, TaskDelta, TaskId};
use rusqlite::{params, Connection, OptionalExtension};

use super::row;

const ENTRY_COLUMNS: &str = "seq, task_id, operation, payload, retry_count, last_error,
    enqueued_at, state, next_attempt_at";

/// `SQLite` storage for pending remote writes
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncQueueEntry> {
        Ok(SyncQueueEntry {
            seq: row.get(0)?,
            task_id: row::parsed(row, 1)?,
            operation: row::parsed(row, 2)?,
            payload: row::json(row, 3)?,
            retry_count: row.get(4)?,
            last_error: row.get(5)?,
            enqueued_at: row.get(6)?,
            state: row::parsed(row, 7)?,
            next_attempt_at: row.get(8)?,
        })
    }

    /// Append an entry and return its sequence number
    pub fn enqueue(
        &self,
        operation: SyncOperation,
        payload: &TaskDelta,
        enqueued_at: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_queue (task_id, operation, payload, enqueued_at, state)
             VALUES (?, ?, ?, ?, 'queued')",
            params![
                payload.id.as_str(),
                operation.as_str(),
                serde_json::to_string(payload)?,
                enqueued_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get(&self, seq: i64) -> Result<Option<SyncQueueEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue WHERE seq = ?"),
                params![seq],
                Self::parse_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// All entries in enqueue order
    pub fn list(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM sync_queue ORDER BY seq ASC"
        ))?;
        let entries = stmt
            .query_map([], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Queued entries in enqueue order, excluding any entry that sits behind a
    /// parked conflict or an in-flight push of the same task
    pub fn drainable(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, task_id, operation, payload, retry_count, last_error,
                    enqueued_at, state, next_attempt_at
             FROM sync_queue q
             WHERE q.state = 'queued'
               AND NOT EXISTS (
                   SELECT 1 FROM sync_queue c
                   WHERE c.task_id = q.task_id AND c.seq < q.seq
                     AND c.state IN ('conflict', 'in_flight')
               )
             ORDER BY q.seq ASC",
        )?;
        let entries = stmt
            .query_map([], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Number of entries not yet acknowledged, parked conflicts included
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn count_for_task(&self, task_id: &TaskId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE task_id = ?",
            params![task_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Whether the task has a parked entry waiting for manual review
    pub fn has_conflict(&self, task_id: &TaskId) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE task_id = ? AND state = 'conflict')",
            params![task_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn set_state(&self, seq: i64, state: QueueState) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET state = ? WHERE seq = ?",
            params![state.as_str(), seq],
        )?;
        Ok(())
    }

    pub fn delete(&self, seq: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE seq = ?", params![seq])?;
        Ok(rows > 0)
    }

    /// Put an entry back in the queue after a transient failure
    pub fn record_failure(
        &self,
        seq: i64,
        error: &str,
        retry_count: u32,
        next_attempt_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue
             SET state = 'queued', retry_count = ?, last_error = ?, next_attempt_at = ?
             WHERE seq = ?",
            params![retry_count, error, next_attempt_at, seq],
        )?;
        Ok(())
    }

    /// Park an entry for manual review
    pub fn park(&self, seq: i64, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET state = 'conflict', last_error = ? WHERE seq = ?",
            params![error, seq],
        )?;
        Ok(())
    }

    /// Put one in-flight entry back in the queue without touching its retry budget
    pub fn release(&self, seq: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET state = 'queued' WHERE seq = ? AND state = 'in_flight'",
            params![seq],
        )?;
        Ok(())
    }

    /// Move every in-flight entry back to queued, returning the affected task ids
    pub fn requeue_in_flight(&self) -> Result<Vec<TaskId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT task_id FROM sync_queue WHERE state = 'in_flight'")?;
        let task_ids = stmt
            .query_map([], |row| row::parsed::<TaskId>(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.conn.execute(
            "UPDATE sync_queue SET state = 'queued' WHERE state = 'in_flight'",
            [],
        )?;
        Ok(task_ids)
    }

    /// Release parked entries of a task back into the queue with a fresh retry budget
    pub fn release_conflicts(&self, task_id: &TaskId) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE sync_queue
             SET state = 'queued', retry_count = 0, next_attempt_at = NULL
             WHERE task_id = ? AND state = 'conflict'",
            params![task_id.as_str()],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteTaskRepository, TaskRepository};
    use crate::models::{SyncState, TaskExecution, TaskStatus};

    fn insert_task(db: &Database) -> TaskExecution {
        let task = TaskExecution {
            id: TaskId::new(),
            work_order_id: "wo-1".to_string(),
            lubrication_point_id: "lp-1".to_string(),
            status: TaskStatus::Completed,
            expected_quantity: None,
            point_location: None,
            quantity_used: None,
            photo_refs: Vec::new(),
            observations: None,
            issue: None,
            completed_at: Some(1),
            executed_by: Some("tech-1".to_string()),
            sync_state: SyncState::LocalOnly,
            created_at: 1,
            updated_at: 1,
            last_synced_at: None,
        };
        SqliteTaskRepository::new(db.connection())
            .insert(&task)
            .unwrap();
        task
    }

    #[test]
    fn test_enqueue_preserves_fifo_order() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());
        let a = insert_task(&db);
        let b = insert_task(&db);

        let first = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&a), 10)
            .unwrap();
        let second = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&b), 5)
            .unwrap();
        assert!(second > first);

        let entries = repo.list().unwrap();
        assert_eq!(
            entries.iter().map(|e| e.task_id).collect::<Vec<_>>(),
            vec![a.id, b.id]
        );
        assert_eq!(entries[0].payload, TaskDelta::from(&a));
        assert_eq!(entries[0].state, QueueState::Queued);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_conflict_blocks_later_entries_of_same_task() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());
        let a = insert_task(&db);
        let b = insert_task(&db);

        let parked = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&a), 1)
            .unwrap();
        repo.enqueue(SyncOperation::Update, &TaskDelta::from(&a), 2)
            .unwrap();
        let other = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&b), 3)
            .unwrap();
        repo.park(parked, "rejected").unwrap();

        let drainable = repo.drainable().unwrap();
        assert_eq!(drainable.len(), 1);
        assert_eq!(drainable[0].seq, other);
        assert_eq!(repo.count().unwrap(), 3);

        assert_eq!(repo.release_conflicts(&a.id).unwrap(), 1);
        assert_eq!(repo.drainable().unwrap().len(), 3);
    }

    #[test]
    fn test_in_flight_entry_holds_back_later_entries_of_same_task() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());
        let a = insert_task(&db);

        let first = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&a), 1)
            .unwrap();
        let second = repo
            .enqueue(SyncOperation::Update, &TaskDelta::from(&a), 2)
            .unwrap();
        repo.set_state(first, QueueState::InFlight).unwrap();
        assert!(repo.drainable().unwrap().is_empty());

        repo.release(first).unwrap();
        let drainable = repo.drainable().unwrap();
        assert_eq!(
            drainable.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(drainable[0].retry_count, 0);
    }

    #[test]
    fn test_has_conflict_tracks_parked_entries() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());
        let a = insert_task(&db);

        let seq = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&a), 1)
            .unwrap();
        assert!(!repo.has_conflict(&a.id).unwrap());
        repo.park(seq, "HTTP 422").unwrap();
        assert!(repo.has_conflict(&a.id).unwrap());
        repo.release_conflicts(&a.id).unwrap();
        assert!(!repo.has_conflict(&a.id).unwrap());
    }

    #[test]
    fn test_requeue_in_flight_returns_affected_tasks() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());
        let a = insert_task(&db);

        let seq = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&a), 1)
            .unwrap();
        repo.set_state(seq, QueueState::InFlight).unwrap();

        assert_eq!(repo.requeue_in_flight().unwrap(), vec![a.id]);
        assert_eq!(repo.get(seq).unwrap().unwrap().state, QueueState::Queued);
        assert!(repo.requeue_in_flight().unwrap().is_empty());
    }

    #[test]
    fn test_record_failure_updates_retry_metadata() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteQueueRepository::new(db.connection());
        let a = insert_task(&db);

        let seq = repo
            .enqueue(SyncOperation::Create, &TaskDelta::from(&a), 1)
            .unwrap();
        repo.set_state(seq, QueueState::InFlight).unwrap();
        repo.record_failure(seq, "HTTP 503", 1, 5_000).unwrap();

        let entry = repo.get(seq).unwrap().unwrap();
        assert_eq!(entry.retry_count, 1);
        assert_eq!(entry.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(entry.next_attempt_at, Some(5_000));
        assert_eq!(entry.state, QueueState::Queued);

        assert!(repo.delete(seq).unwrap());
        assert!(!repo.delete(seq).unwrap());
    }
}
