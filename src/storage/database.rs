use crate::storage::errors::{Result, StorageError};
use crate::storage::schema::{self, current_timestamp};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Environment variable that overrides the data directory
pub const DATA_DIR_ENV: &str = "TICTAC_DATA_DIR";

const DATABASE_FILE: &str = "tictac.sqlite";

/// SQLite-backed key/value store
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::database_path_error(format!(
                    "Failed to create database directory: {}",
                    e
                ))
            })?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        info!(path = %db_path.display(), "Opened database");
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Execute a closure with access to the connection
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!(key, value, "Storing value");
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                (key, value, current_timestamp()),
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.with_connection(|conn| Ok(conn.execute("DELETE FROM kv WHERE key = ?1", [key])? > 0))
    }

    /// Delete every stored key
    pub fn clear(&self) -> Result<usize> {
        let removed = self.with_connection(|conn| Ok(conn.execute("DELETE FROM kv", [])?))?;
        debug!(removed, "Cleared key/value store");
        Ok(removed)
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }
}

/// Directory holding the database, honoring `TICTAC_DATA_DIR`
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(custom_data_dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(custom_data_dir));
    }

    let project_dirs = ProjectDirs::from("dev", "tictac", "tictac").ok_or_else(|| {
        StorageError::database_path_error("Failed to determine application data directory")
    })?;
    Ok(project_dirs.data_dir().to_path_buf())
}

/// Database file inside an explicit data directory
pub fn database_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get("identity").unwrap(), None);
        db.set("identity", "abc").unwrap();
        db.set("identity", "def").unwrap();
        assert_eq!(db.get("identity").unwrap().as_deref(), Some("def"));
    }

    #[test]
    fn test_remove_and_clear() {
        let db = Database::open_in_memory().unwrap();
        db.set("a", "1").unwrap();
        db.set("b", "2").unwrap();
        assert_eq!(db.keys().unwrap(), vec!["a", "b"]);
        assert!(db.remove("a").unwrap());
        assert!(!db.remove("a").unwrap());
        assert_eq!(db.clear().unwrap(), 1);
        assert!(db.keys().unwrap().is_empty());
    }

    #[test]
    fn test_database_path_file_name() {
        let path = database_path_in(Path::new("/tmp/somewhere"));
        assert!(path.to_string_lossy().ends_with("tictac.sqlite"));
    }
}
