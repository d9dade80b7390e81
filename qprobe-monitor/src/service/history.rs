//! Verification history
//!
//! Keeps a short, newest-first list of past verification results for display.
//! The list lives in an injectable key-value store; it is a convenience cache,
//! so store failures are logged and never interrupt a verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::warn;

/// Key under which the history is stored
pub const HISTORY_KEY: &str = "queue_verification_history";

/// Number of entries kept by default
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Errors raised by a key-value store
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store is full: {0}")]
    QuotaExceeded(String),
}

/// Minimal string key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, HistoryError>;

    fn set(&self, key: &str, value: &str) -> Result<(), HistoryError>;

    fn remove(&self, key: &str) -> Result<(), HistoryError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, HistoryError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Store keeping one JSON file per key in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, HistoryError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HistoryError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), HistoryError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One past verification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded history of verification results
///
/// Entries are kept in memory and written through to the store. Inside a
/// tokio runtime the write runs on the blocking pool, so recording never
/// blocks the caller on file I/O; writes carry a version and a stale one is
/// never applied over a newer one.
#[derive(Clone)]
pub struct VerificationHistory {
    inner: Arc<HistoryInner>,
}

struct HistoryInner {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
    entries: Mutex<Vec<HistoryEntry>>,
    version: AtomicU64,
    written: Mutex<u64>,
}

impl HistoryInner {
    fn persist(&self, version: u64, json: &str) {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if version <= *written {
            return;
        }
        match self.store.set(HISTORY_KEY, json) {
            Ok(()) => *written = version,
            Err(e) => warn!(error = %e, "Failed to save verification history"),
        }
    }
}

impl VerificationHistory {
    /// Loads the stored history
    ///
    /// Unreadable or corrupt history starts out empty.
    pub fn new(store: Arc<dyn KeyValueStore>, limit: usize) -> Self {
        let mut entries = load(store.as_ref());
        entries.truncate(limit);

        Self {
            inner: Arc::new(HistoryInner {
                store,
                limit,
                entries: Mutex::new(entries),
                version: AtomicU64::new(0),
                written: Mutex::new(0),
            }),
        }
    }

    /// Prepends an entry, dropping the oldest beyond the limit
    pub fn record(&self, entry: HistoryEntry) {
        let (snapshot, version) = {
            let mut entries = self.lock_entries();
            entries.insert(0, entry);
            entries.truncate(self.inner.limit);
            let version = self.inner.version.fetch_add(1, Ordering::SeqCst) + 1;
            (serde_json::to_string(&*entries), version)
        };

        let json = match snapshot {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize verification history");
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || inner.persist(version, &json));
            }
            Err(_) => inner.persist(version, &json),
        }
    }

    /// Entries, newest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock_entries().clone()
    }

    pub fn clear(&self) {
        let version = {
            let mut entries = self.lock_entries();
            entries.clear();
            self.inner.version.fetch_add(1, Ordering::SeqCst) + 1
        };

        let mut written = self
            .inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match self.inner.store.remove(HISTORY_KEY) {
            Ok(()) => *written = (*written).max(version),
            Err(e) => warn!(error = %e, "Failed to clear verification history"),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn load(store: &dyn KeyValueStore) -> Vec<HistoryEntry> {
    let raw = match store.get(HISTORY_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read verification history");
            return Vec::new();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "Discarding corrupt verification history");
        Vec::new()
    })
}

impl std::fmt::Debug for VerificationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationHistory")
            .field("limit", &self.inner.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FullStore;

    impl KeyValueStore for FullStore {
        fn get(&self, _key: &str) -> Result<Option<String>, HistoryError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), HistoryError> {
            Err(HistoryError::QuotaExceeded("no space left".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), HistoryError> {
            Ok(())
        }
    }

    fn entry(n: usize) -> HistoryEntry {
        HistoryEntry {
            status: "completed".to_string(),
            message: format!("run {n}"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_history_is_newest_first_and_bounded() {
        let history = VerificationHistory::new(Arc::new(InMemoryStore::new()), DEFAULT_HISTORY_LIMIT);
        for n in 0..15 {
            history.record(entry(n));
        }

        let entries = history.entries();
        assert_eq!(entries.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(entries[0].message, "run 14");
        assert_eq!(entries[9].message, "run 5");
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let history = VerificationHistory::new(Arc::new(FullStore), DEFAULT_HISTORY_LIMIT);
        history.record(entry(1));
        assert_eq!(history.entries().len(), 1);
    }

    #[test]
    fn test_history_survives_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let history = VerificationHistory::new(Arc::clone(&store), 3);
        history.record(entry(1));
        history.record(entry(2));

        let reloaded = VerificationHistory::new(store, 3);
        assert_eq!(reloaded.entries(), history.entries());
        assert_eq!(reloaded.entries()[0].message, "run 2");
    }

    #[tokio::test]
    async fn test_file_writes_leave_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));
        let history = VerificationHistory::new(Arc::clone(&store), DEFAULT_HISTORY_LIMIT);

        for n in 0..5 {
            history.record(entry(n));
        }
        assert_eq!(history.entries()[0].message, "run 4");

        // Writes land on the blocking pool; the newest snapshot wins.
        let mut persisted = Vec::new();
        for _ in 0..100 {
            persisted = load(store.as_ref());
            if persisted.len() == 5 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(persisted.len(), 5);
        assert_eq!(persisted[0].message, "run 4");
    }

    #[test]
    fn test_corrupt_history_reads_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.set(HISTORY_KEY, "{not json").unwrap();

        let history = VerificationHistory::new(store, DEFAULT_HISTORY_LIMIT);
        assert!(history.entries().is_empty());

        history.record(entry(1));
        assert_eq!(history.entries().len(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("history"));

        assert_eq!(store.get("a/b").unwrap(), None);
        store.set("a/b", "[1]").unwrap();
        assert_eq!(store.get("a/b").unwrap().as_deref(), Some("[1]"));
        assert!(dir.path().join("history").join("a_b.json").exists());

        store.remove("a/b").unwrap();
        store.remove("a/b").unwrap();
        assert_eq!(store.get("a/b").unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let history = VerificationHistory::new(Arc::new(InMemoryStore::new()), 3);
        history.record(entry(1));
        history.clear();
        assert!(history.entries().is_empty());
    }
}
