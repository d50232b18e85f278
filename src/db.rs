use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded writing '{key}' ({bytes} bytes)")]
    QuotaExceeded { key: String, bytes: usize },

    #[error("Stored value under '{key}' is not UTF-8 text")]
    Corrupt { key: String },

    #[error("Storage backend error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare storage directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Named-blob storage. Every namespace is read and written as a whole.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub struct SqliteStorage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let storage = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        storage.init()?;
        Ok(storage)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let storage = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        storage.init()?;
        Ok(storage)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    /// Caps the database file at `pages` pages. Writes past the cap fail with
    /// `StorageError::QuotaExceeded`. Returns the limit SQLite actually applied,
    /// which is never below the current page count.
    pub fn set_max_page_count(&self, pages: i64) -> Result<i64, StorageError> {
        let applied = self
            .conn
            .pragma_update_and_check(None, "max_page_count", pages, |row| row.get(0))?;
        Ok(applied)
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let result = self.conn.query_row(
            "SELECT value FROM blobs WHERE key = ?1",
            [key],
            |row| {
                Ok(match row.get_ref(0)? {
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(bytes.to_vec()),
                    _ => None,
                })
            },
        );
        let bytes = match result {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(StorageError::Corrupt { key: key.to_string() }),
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = String::from_utf8(bytes)
            .map_err(|_| StorageError::Corrupt { key: key.to_string() })?;
        debug!(key, bytes = value.len(), "read blob");
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO blobs (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .map_err(|e| map_write_error(key, value.len(), e))?;
        debug!(key, bytes = value.len(), "wrote blob");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM blobs WHERE key = ?1", [key])?;
        debug!(key, "deleted blob");
        Ok(())
    }
}

fn map_write_error(key: &str, bytes: usize, err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == rusqlite::ErrorCode::DiskFull => {
            StorageError::QuotaExceeded {
                key: key.to_string(),
                bytes,
            }
        }
        other => StorageError::Sqlite(other),
    }
}

/// In-process storage, optionally capped at a total byte size (keys plus
/// values) the way a browser's local storage is.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: RefCell<HashMap<String, String>>,
    quota: Option<usize>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            blobs: RefCell::new(HashMap::new()),
            quota: Some(bytes),
        }
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.blobs.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut blobs = self.blobs.borrow_mut();
        if let Some(quota) = self.quota {
            let others: usize = blobs
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: value.len(),
                });
            }
        }
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_missing_key_is_none() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.get("nope").unwrap(), None);
    }

    #[test]
    fn test_sqlite_set_overwrites_and_delete_removes() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.set("k", "one").unwrap();
        storage.set("k", "two").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("two"));

        storage.delete("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
        // deleting again is fine
        storage.delete("k").unwrap();
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scout.db");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set("scout.lists", r#"{"AI":[1]}"#).unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.path(), Some(path.as_path()));
        assert_eq!(
            storage.get("scout.lists").unwrap().as_deref(),
            Some(r#"{"AI":[1]}"#)
        );
    }

    #[test]
    fn test_sqlite_full_database_is_quota_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(&dir.path().join("small.db")).unwrap();
        storage.set_max_page_count(4).unwrap();

        let big = "x".repeat(256 * 1024);
        let err = storage.set("scout.notes", &big).unwrap_err();
        assert!(
            matches!(err, StorageError::QuotaExceeded { ref key, .. } if key == "scout.notes"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_sqlite_invalid_utf8_is_corrupt() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO blobs (key, value) VALUES ('scout.lists', CAST(x'7bff7d' AS TEXT))",
                [],
            )
            .unwrap();
        storage
            .conn
            .execute("INSERT INTO blobs (key, value) VALUES ('scout.notes', x'c328')", [])
            .unwrap();

        let err = storage.get("scout.lists").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key } if key == "scout.lists"));
        let err = storage.get("scout.notes").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key } if key == "scout.notes"));

        // a blob that happens to be valid UTF-8 is still readable
        storage
            .conn
            .execute("INSERT INTO blobs (key, value) VALUES ('scout.searches', x'5b5d')", [])
            .unwrap();
        assert_eq!(storage.get("scout.searches").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_store_recovers_from_undecodable_blob() {
        use crate::store::Store;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage
                .conn
                .execute(
                    "INSERT INTO blobs (key, value) VALUES ('scout.lists', CAST(x'7bff7d' AS TEXT))",
                    [],
                )
                .unwrap();
        }

        let store = Store::new(SqliteStorage::open(&path).unwrap());
        assert!(store.lists().unwrap().is_empty());
        assert!(store.save_to_list("AI", 1).unwrap());
        assert_eq!(store.list("AI").unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_memory_quota_counts_other_keys() {
        let storage = MemoryStorage::with_quota(20);
        storage.set("a", "123456789").unwrap(); // 10 bytes
        storage.set("a", "1234567890123456789").unwrap(); // replaces, 20 bytes

        let err = storage.set("b", "1").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { bytes: 1, .. }));

        // failed write leaves existing data alone
        assert_eq!(storage.get("b").unwrap(), None);
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1234567890123456789"));
    }
}
