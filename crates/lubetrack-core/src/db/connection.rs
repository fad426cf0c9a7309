//! Database connection management

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::migrations;

/// How long a statement waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper for the local `SQLite` store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for a single-writer device store
    fn configure(&self) -> Result<()> {
        // `sync --watch` and one-shot commands share the file
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = 10000;",
        )?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Cloneable handle to one [`Database`] shared by the ledger, registry,
/// alert manager and sync engine.
///
/// The lock is only ever held for synchronous statement execution and never
/// across an `.await`.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(database: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(database)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Run `operation` with exclusive access to the connection
    pub fn with<T>(&self, operation: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        operation(guard.connection())
    }

    /// Run `operation` inside a transaction, committing only on `Ok`
    pub fn transaction<T>(&self, operation: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        let tx = guard.connection().unchecked_transaction()?;
        let value = operation(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        // A panic mid-statement leaves SQLite consistent, so keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let value: i32 = db
            .connection()
            .query_row("SELECT 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("ledger.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_waits_on_locks_held_by_other_processes() {
        let tmp = tempdir().unwrap();
        let db = Database::open(tmp.path().join("ledger.db")).unwrap();
        let timeout: i64 = db
            .connection()
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let shared = SharedDatabase::open_in_memory().unwrap();
        let result: Result<()> = shared.transaction(|conn| {
            conn.execute(
                "INSERT INTO incidents (id, task_id, issue_type, severity, description, reported_by, created_at)
                 VALUES ('i1', 't1', 'leak', 'low', 'oil leak', 'u1', 0)",
                [],
            )?;
            Err(crate::Error::InvalidInput("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = shared
            .with(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}
