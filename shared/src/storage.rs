//! Pluggable storage contract shared between the manager and the worker.
//!
//! `Store<T>` is generic over the record kind rather than erased behind
//! `dyn Any`, so a `Put` of the wrong record type is a compile error instead
//! of the runtime type-assertion failure the value-kind-erased design would
//! produce. Two implementations are provided: an in-memory map for
//! `dbtype=memory`, and a SQLite-backed "bucket" for `dbtype=persistent`,
//! using one `rusqlite` connection per store instance.

use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uniform put/get/list/count contract over one record kind, keyed by a
/// universally-unique identifier.
pub trait Store<T>: Send + Sync
where
    T: Serialize + DeserializeOwned,
{
    fn put(&self, key: Uuid, value: &T) -> Result<(), StorageError>;
    fn get(&self, key: Uuid) -> Result<T, StorageError>;
    fn list(&self) -> Result<Vec<T>, StorageError>;
    fn count(&self) -> Result<usize, StorageError>;
}

/// In-memory store backed by a mutex-guarded map. `dbtype=memory`.
pub struct InMemoryStore<T> {
    records: Mutex<HashMap<Uuid, T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Store<T> for InMemoryStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, key: Uuid, value: &T) -> Result<(), StorageError> {
        self.records
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(key, value.clone());
        Ok(())
    }

    fn get(&self, key: Uuid) -> Result<T, StorageError> {
        self.records
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    fn list(&self) -> Result<Vec<T>, StorageError> {
        let records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut entries: Vec<(Uuid, T)> = records.iter().map(|(k, v)| (*k, v.clone())).collect();
        entries.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
        Ok(entries.into_iter().map(|(_, v)| v).collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.records.lock().unwrap_or_else(|poison| poison.into_inner()).len())
    }
}

/// SQLite-backed store. One "bucket" (table) per record kind, with a
/// `(id TEXT PRIMARY KEY, value TEXT NOT NULL)` schema, matching the
/// "bucket" concept of the storage design. Bucket creation is idempotent.
pub struct SqliteStore<T> {
    connection: Mutex<Connection>,
    bucket: String,
    _marker: std::marker::PhantomData<T>,
}

impl<T> SqliteStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Opens (creating if absent) a SQLite database at `path` and ensures the
    /// named bucket exists. `path`'s parent directory is created if needed.
    pub fn open<P: AsRef<Path>>(path: P, bucket: &str) -> Result<Self, StorageError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connection = Connection::open(&path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.busy_timeout(std::time::Duration::from_secs(30))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {bucket} (id TEXT PRIMARY KEY, value TEXT NOT NULL)"
        );
        connection.execute(&create_sql, [])?;

        Ok(Self {
            connection: Mutex::new(connection),
            bucket: bucket.to_string(),
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T> Store<T> for SqliteStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn put(&self, key: Uuid, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        let conn = self.connection.lock().unwrap_or_else(|poison| poison.into_inner());
        conn.execute(
            &format!("INSERT INTO {} (id, value) VALUES (?1, ?2) ON CONFLICT(id) DO UPDATE SET value = excluded.value", self.bucket),
            rusqlite::params![key.to_string(), json],
        )?;
        Ok(())
    }

    fn get(&self, key: Uuid) -> Result<T, StorageError> {
        let conn = self.connection.lock().unwrap_or_else(|poison| poison.into_inner());
        let json: String = conn
            .query_row(
                &format!("SELECT value FROM {} WHERE id = ?1", self.bucket),
                rusqlite::params![key.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(key),
                other => StorageError::Database(other),
            })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list(&self) -> Result<Vec<T>, StorageError> {
        let conn = self.connection.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM {} ORDER BY id ASC",
            self.bucket
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let conn = self.connection.lock().unwrap_or_else(|poison| poison.into_inner());
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.bucket), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{State, Task};

    #[test]
    fn in_memory_put_get_roundtrips() {
        let store: InMemoryStore<Task> = InMemoryStore::new();
        let task = Task::new("web", "nginx:latest");
        store.put(task.id, &task).unwrap();
        let fetched = store.get(task.id).unwrap();
        assert_eq!(fetched, task);
    }

    #[test]
    fn in_memory_get_missing_is_not_found() {
        let store: InMemoryStore<Task> = InMemoryStore::new();
        let err = store.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn in_memory_list_is_sorted_by_id() {
        let store: InMemoryStore<Task> = InMemoryStore::new();
        let mut tasks: Vec<Task> = (0..5).map(|_| Task::new("t", "img")).collect();
        for t in &tasks {
            store.put(t.id, t).unwrap();
        }
        tasks.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        let listed = store.list().unwrap();
        assert_eq!(listed, tasks);
    }

    #[test]
    fn sqlite_store_roundtrips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let mut task = Task::new("web", "nginx:latest");
        task.state = State::Running;

        {
            let store: SqliteStore<Task> = SqliteStore::open(&path, "tasks").unwrap();
            store.put(task.id, &task).unwrap();
        }
        {
            let store: SqliteStore<Task> = SqliteStore::open(&path, "tasks").unwrap();
            let fetched = store.get(task.id).unwrap();
            assert_eq!(fetched, task);
            assert_eq!(store.count().unwrap(), 1);
        }
    }

    #[test]
    fn sqlite_store_list_is_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let store: SqliteStore<Task> = SqliteStore::open(&path, "tasks").unwrap();
        let mut tasks: Vec<Task> = (0..4).map(|_| Task::new("t", "img")).collect();
        for t in &tasks {
            store.put(t.id, t).unwrap();
        }
        tasks.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        assert_eq!(store.list().unwrap(), tasks);
    }
}
