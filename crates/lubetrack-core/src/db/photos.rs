//! Photo evidence repository

use crate::error::Result;
use crate::models::{PhotoHash, PhotoRecord};
use rusqlite::{params, Connection, OptionalExtension};

use super::row;

const RECORD_COLUMNS: &str = "hash, timestamp, task_id, user_id, kind, remote_url";

/// Append-only `SQLite` storage for registered evidence hashes
pub struct SqlitePhotoRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePhotoRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PhotoRecord> {
        Ok(PhotoRecord {
            hash: PhotoHash::new(row.get::<_, String>(0)?),
            timestamp: row.get(1)?,
            task_id: row::parsed(row, 2)?,
            user_id: row.get(3)?,
            kind: row::parsed(row, 4)?,
            remote_url: row.get(5)?,
        })
    }

    pub fn find(&self, hash: &PhotoHash) -> Result<Option<PhotoRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM photo_records WHERE hash = ?"),
                params![hash.as_str()],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Every registered record, oldest first
    pub fn all(&self) -> Result<Vec<PhotoRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM photo_records ORDER BY timestamp ASC"
        ))?;
        let records = stmt
            .query_map([], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn insert(&self, record: &PhotoRecord) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO photo_records ({RECORD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"),
            params![
                record.hash.as_str(),
                record.timestamp,
                record.task_id.as_str(),
                record.user_id,
                record.kind.as_str(),
                record.remote_url,
            ],
        )?;
        Ok(())
    }

    pub fn count_since(&self, since: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photo_records WHERE timestamp >= ?",
            params![since],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Keep the raw image until the remote authority has a copy
    pub fn stage_upload(&self, hash: &PhotoHash, bytes: &[u8], staged_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO photo_uploads (hash, bytes, staged_at) VALUES (?, ?, ?)",
            params![hash.as_str(), bytes, staged_at],
        )?;
        Ok(())
    }

    pub fn staged_bytes(&self, hash: &PhotoHash) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .conn
            .query_row(
                "SELECT bytes FROM photo_uploads WHERE hash = ?",
                params![hash.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes)
    }

    /// Record the durable URL and drop the staged bytes
    pub fn complete_upload(&self, hash: &PhotoHash, remote_url: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE photo_records SET remote_url = ? WHERE hash = ?",
            params![remote_url, hash.as_str()],
        )?;
        self.conn.execute(
            "DELETE FROM photo_uploads WHERE hash = ?",
            params![hash.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{PhotoKind, TaskId};

    #[test]
    fn test_insert_find_and_upload_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqlitePhotoRepository::new(db.connection());

        let record = PhotoRecord::new(PhotoHash::new("abc"), TaskId::new(), "tech-1", PhotoKind::Before);
        repo.insert(&record).unwrap();
        repo.stage_upload(&record.hash, b"jpeg", 5).unwrap();

        assert_eq!(repo.find(&record.hash).unwrap(), Some(record.clone()));
        assert_eq!(repo.staged_bytes(&record.hash).unwrap(), Some(b"jpeg".to_vec()));

        repo.complete_upload(&record.hash, "https://cdn.example.com/abc")
            .unwrap();
        let stored = repo.find(&record.hash).unwrap().unwrap();
        assert_eq!(stored.remote_url.as_deref(), Some("https://cdn.example.com/abc"));
        assert!(repo.staged_bytes(&record.hash).unwrap().is_none());
    }

    #[test]
    fn test_hash_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqlitePhotoRepository::new(db.connection());

        let hash = PhotoHash::new("same");
        repo.insert(&PhotoRecord::new(hash.clone(), TaskId::new(), "a", PhotoKind::Before))
            .unwrap();
        assert!(repo
            .insert(&PhotoRecord::new(hash, TaskId::new(), "b", PhotoKind::After))
            .is_err());
    }
}
