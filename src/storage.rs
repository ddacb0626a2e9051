use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, DatabaseName, OpenFlags};
use std::sync::{Arc, Mutex};

use crate::record::DetectionRecord;

/// Backing store for detection rows: `(object, timestamp)`.
pub trait DetectionStore: Send {
    /// Insert and commit one row.
    fn insert(&mut self, object: &str, timestamp: &str) -> Result<()>;

    /// Release the connection. Later inserts fail.
    fn close(&mut self) -> Result<()>;
}

pub struct SqliteDetectionStore {
    conn: Option<Connection>,
    db_path: String,
}

impl SqliteDetectionStore {
    /// Open (creating if needed) the database and its table.
    ///
    /// Fails when the path cannot be opened read-write, e.g. a missing parent
    /// directory or a read-only file.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open detection store {}", db_path))?;
        let mut store = Self {
            conn: Some(conn),
            db_path: db_path.to_string(),
        };
        store.ensure_schema()?;
        store.ensure_writable()?;
        Ok(store)
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| anyhow!("detection store {} is closed", self.db_path))
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS object_detection (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              object TEXT NOT NULL,
              timestamp TEXT NOT NULL
            );
            "#,
            )
            .with_context(|| format!("failed to prepare schema in {}", self.db_path))?;
        Ok(())
    }

    /// SQLite silently degrades to read-only for write-protected files and
    /// `?mode=ro` URIs; every insert would then fail.
    fn ensure_writable(&self) -> Result<()> {
        let readonly = self
            .conn()?
            .is_readonly(DatabaseName::Main)
            .with_context(|| format!("failed to query access mode of {}", self.db_path))?;
        if readonly {
            return Err(anyhow!("detection store {} is read-only", self.db_path));
        }
        Ok(())
    }

    /// All rows in insertion order.
    pub fn rows(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT object, timestamp FROM object_detection ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push((row.get(0)?, row.get(1)?));
        }
        Ok(out)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }
}

impl DetectionStore for SqliteDetectionStore {
    fn insert(&mut self, object: &str, timestamp: &str) -> Result<()> {
        // Autocommit mode: each statement is its own transaction.
        self.conn()?.execute(
            "INSERT INTO object_detection(object, timestamp) VALUES (?1, ?2)",
            params![object, timestamp],
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| anyhow!("failed to close detection store {}: {}", self.db_path, e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    rows: Vec<(String, String)>,
    attempts: u64,
    fail_objects: Vec<String>,
    fail_all: bool,
    closed: bool,
}

/// Shared in-memory store. Clones observe the same rows, so a test can keep
/// a handle after moving the store into a pipeline.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDetectionStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert for `object` fails.
    pub fn fail_inserts_for(self, object: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_objects.push(object.to_string());
        }
        self
    }

    /// Every insert fails.
    pub fn fail_all_inserts(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_all = true;
        }
        self
    }

    pub fn rows(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .map(|state| state.rows.clone())
            .unwrap_or_default()
    }

    /// Number of insert calls, successful or not.
    pub fn attempts(&self) -> u64 {
        self.state.lock().map(|state| state.attempts).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(false)
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn insert(&mut self, object: &str, timestamp: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        state.attempts += 1;
        if state.closed {
            return Err(anyhow!("in-memory store is closed"));
        }
        if state.fail_all || state.fail_objects.iter().any(|o| o == object) {
            return Err(anyhow!("injected insert failure for {}", object));
        }
        state.rows.push((object.to_string(), timestamp.to_string()));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        state.closed = true;
        Ok(())
    }
}

/// Result of a best-effort write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted,
    Dropped,
}

/// Best-effort durable writes.
///
/// A failed insert is logged and counted, never returned as an error: the
/// record still counts, draws and exports.
pub struct PersistenceSink {
    store: Box<dyn DetectionStore>,
    persisted: u64,
    failed: u64,
    closed: bool,
}

impl PersistenceSink {
    pub fn new(store: Box<dyn DetectionStore>) -> Self {
        Self {
            store,
            persisted: 0,
            failed: 0,
            closed: false,
        }
    }

    pub fn write(&mut self, record: &DetectionRecord) -> WriteOutcome {
        let timestamp = record.timestamp.to_string();
        match self.store.insert(&record.class_name, &timestamp) {
            Ok(()) => {
                self.persisted += 1;
                WriteOutcome::Persisted
            }
            Err(e) => {
                self.failed += 1;
                log::warn!(
                    "store write dropped: object={} timestamp={} frame={}: {:#}",
                    record.class_name,
                    timestamp,
                    record.frame_index,
                    e
                );
                WriteOutcome::Dropped
            }
        }
    }

    pub fn persisted(&self) -> u64 {
        self.persisted
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed
    }

    /// Close the store once. Further calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.store.close() {
            log::error!("closing detection store failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BoundingBox, Timestamp};
    use chrono::NaiveDate;

    fn record(class_name: &str) -> DetectionRecord {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        DetectionRecord::new(
            class_name,
            Timestamp::new(at),
            BoundingBox::new(1, 2, 3, 4),
            Some(0.9),
            0,
        )
    }

    #[test]
    fn sqlite_store_inserts_rows_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("detections.db");
        let path = path.to_str().unwrap().to_string();
        let mut store = SqliteDetectionStore::open(&path)?;
        store.insert("car", "2024-01-02 03:04:05")?;
        store.insert("person", "2024-01-02 03:04:06")?;
        assert_eq!(
            store.rows()?,
            vec![
                ("car".to_string(), "2024-01-02 03:04:05".to_string()),
                ("person".to_string(), "2024-01-02 03:04:06".to_string()),
            ]
        );

        store.close()?;
        assert!(store.insert("car", "2024-01-02 03:04:07").is_err());
        store.close()?;

        // Rows survive reopening.
        let reopened = SqliteDetectionStore::open(&path)?;
        assert_eq!(reopened.rows()?.len(), 2);
        Ok(())
    }

    #[test]
    fn sqlite_open_fails_for_unreachable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("detections.db");
        assert!(SqliteDetectionStore::open(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn sqlite_open_rejects_read_only_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("detections.db");
        let path = path.to_str().unwrap().to_string();
        SqliteDetectionStore::open(&path)?.close()?;

        let err = match SqliteDetectionStore::open(&format!("file:{}?mode=ro", path)) {
            Ok(_) => panic!("read-only store must be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("read-only"));
        Ok(())
    }

    #[test]
    fn sink_absorbs_failed_writes() {
        let store = InMemoryDetectionStore::new().fail_inserts_for("person");
        let handle = store.clone();
        let mut sink = PersistenceSink::new(Box::new(store));

        assert_eq!(sink.write(&record("car")), WriteOutcome::Persisted);
        assert_eq!(sink.write(&record("person")), WriteOutcome::Dropped);
        assert_eq!(sink.write(&record("car")), WriteOutcome::Persisted);

        assert_eq!(sink.persisted(), 2);
        assert_eq!(sink.failed_writes(), 1);
        assert_eq!(handle.attempts(), 3);
        assert_eq!(
            handle.rows(),
            vec![
                ("car".to_string(), "2024-01-02 03:04:05".to_string()),
                ("car".to_string(), "2024-01-02 03:04:05".to_string()),
            ]
        );
    }

    #[test]
    fn sink_closes_store_once() {
        let store = InMemoryDetectionStore::new();
        let handle = store.clone();
        let mut sink = PersistenceSink::new(Box::new(store));
        sink.close();
        sink.close();
        assert!(handle.is_closed());
        assert_eq!(sink.write(&record("car")), WriteOutcome::Dropped);
    }
}
