//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, V1_LEDGER)?;
    }
    if version < 2 {
        apply(conn, 2, V2_EVIDENCE)?;
    }
    if version < 3 {
        apply(conn, 3, V3_FRAUD_ALERTS)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    Ok(())
}

/// Version 1: tasks, sync queue, incidents
const V1_LEDGER: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        work_order_id TEXT NOT NULL,
        lubrication_point_id TEXT NOT NULL,
        status TEXT NOT NULL,
        expected_amount REAL,
        expected_unit TEXT,
        point_latitude REAL,
        point_longitude REAL,
        quantity_amount REAL,
        quantity_unit TEXT,
        photo_refs TEXT NOT NULL DEFAULT '[]',
        observations TEXT,
        issue TEXT,
        completed_at INTEGER,
        executed_by TEXT,
        sync_state TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        last_synced_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_sync_state ON tasks(sync_state)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_executed ON tasks(executed_by, completed_at DESC)",
    "CREATE TABLE IF NOT EXISTS sync_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        operation TEXT NOT NULL,
        payload TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        enqueued_at INTEGER NOT NULL,
        state TEXT NOT NULL DEFAULT 'queued',
        next_attempt_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_task ON sync_queue(task_id, seq)",
    "CREATE TABLE IF NOT EXISTS incidents (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL,
        issue_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        description TEXT NOT NULL,
        reported_by TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
];

/// Version 2: append-only photo evidence registry and upload staging
const V2_EVIDENCE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS photo_records (
        hash TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        task_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        remote_url TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_photo_records_timestamp ON photo_records(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_photo_records_task ON photo_records(task_id)",
    "CREATE TRIGGER IF NOT EXISTS photo_records_no_delete BEFORE DELETE ON photo_records
     BEGIN
         SELECT RAISE(ABORT, 'photo records are append-only');
     END",
    "CREATE TRIGGER IF NOT EXISTS photo_records_immutable BEFORE UPDATE ON photo_records
     FOR EACH ROW
     WHEN NEW.hash IS NOT OLD.hash
       OR NEW.timestamp IS NOT OLD.timestamp
       OR NEW.task_id IS NOT OLD.task_id
       OR NEW.user_id IS NOT OLD.user_id
       OR NEW.kind IS NOT OLD.kind
     BEGIN
         SELECT RAISE(ABORT, 'photo records are append-only');
     END",
    "CREATE TABLE IF NOT EXISTS photo_uploads (
        hash TEXT PRIMARY KEY REFERENCES photo_records(hash),
        bytes BLOB NOT NULL,
        staged_at INTEGER NOT NULL
    )",
];

/// Version 3: fraud alerts with write-once resolution
const V3_FRAUD_ALERTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS fraud_alerts (
        id TEXT PRIMARY KEY,
        alert_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        user_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        description TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        resolved INTEGER NOT NULL DEFAULT 0,
        resolved_by TEXT,
        resolved_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_fraud_alerts_timestamp ON fraud_alerts(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_fraud_alerts_user_task ON fraud_alerts(user_id, task_id, resolved)",
    "CREATE TRIGGER IF NOT EXISTS fraud_alerts_write_once BEFORE UPDATE ON fraud_alerts
     FOR EACH ROW
     WHEN OLD.resolved = 1
       OR NEW.alert_type IS NOT OLD.alert_type
       OR NEW.severity IS NOT OLD.severity
       OR NEW.user_id IS NOT OLD.user_id
       OR NEW.task_id IS NOT OLD.task_id
       OR NEW.description IS NOT OLD.description
       OR NEW.timestamp IS NOT OLD.timestamp
     BEGIN
         SELECT RAISE(ABORT, 'fraud alerts are immutable once created');
     END",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_photo_records_reject_delete() {
        let conn = setup();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO photo_records (hash, timestamp, task_id, user_id, kind)
             VALUES ('h1', 1, 't1', 'u1', 'before')",
            [],
        )
        .unwrap();

        let err = conn
            .execute("DELETE FROM photo_records WHERE hash = 'h1'", [])
            .unwrap_err();
        assert!(err.to_string().contains("append-only"));

        // remote_url is the one column that may be filled in later
        conn.execute(
            "UPDATE photo_records SET remote_url = 'https://cdn/h1' WHERE hash = 'h1'",
            [],
        )
        .unwrap();
        assert!(conn
            .execute("UPDATE photo_records SET task_id = 't2' WHERE hash = 'h1'", [])
            .is_err());
    }
}
