//! The store itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::path::{PathError, normalize_path};

/// A file held by the store.
///
/// Only the store constructs records, and `size` is always derived from
/// `content` on write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "name")]
    path: String,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    size: usize,
}

impl FileRecord {
    fn new(path: String, content: String, created_at: DateTime<Utc>) -> Self {
        let size = content.chars().count();
        Self {
            path,
            content,
            created_at,
            updated_at: Utc::now(),
            size,
        }
    }

    /// Canonical path (the store key).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// When the path was first written. Overwrites keep it.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the content was last written.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Length of the content in characters.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Whether a write created a new path or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Created,
    Updated,
}

/// The result of a write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub record: FileRecord,
    pub kind: WriteKind,
}

/// Errors from the file store. Absence is never an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileStoreError {
    #[error("Invalid path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, FileRecord>,
    /// Keys in first-insertion order
    order: Vec<String>,
}

/// In-memory `path → FileRecord` map.
///
/// Every call is atomic. There is no locking across calls: concurrent writes
/// to the same path are last-writer-wins.
#[derive(Default)]
pub struct VirtualFileStore {
    inner: RwLock<Inner>,
}

impl VirtualFileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn key(path: &str) -> Result<String, FileStoreError> {
        normalize_path(path).map_err(|source| FileStoreError::InvalidPath {
            path: path.to_string(),
            source,
        })
    }

    /// Create or replace the file at `path`.
    pub fn put(&self, path: &str, content: impl Into<String>) -> Result<FileRecord, FileStoreError> {
        self.write(path, content).map(|outcome| outcome.record)
    }

    /// Like [`put`](Self::put), also reporting whether the path was new.
    pub fn write(&self, path: &str, content: impl Into<String>) -> Result<WriteOutcome, FileStoreError> {
        let key = Self::key(path)?;
        let content = content.into();
        let mut inner = self.write_lock();

        let (created_at, kind) = match inner.records.get(&key) {
            Some(existing) => (existing.created_at, WriteKind::Updated),
            None => (Utc::now(), WriteKind::Created),
        };

        let record = FileRecord::new(key.clone(), content, created_at);
        if kind == WriteKind::Created {
            inner.order.push(key.clone());
        }
        inner.records.insert(key, record.clone());

        debug!(path = %record.path, size = record.size, ?kind, "Virtual file written");
        Ok(WriteOutcome { record, kind })
    }

    /// Look up a file. Invalid paths are simply absent.
    pub fn get(&self, path: &str) -> Option<FileRecord> {
        let key = Self::key(path).ok()?;
        self.read().records.get(&key).cloned()
    }

    /// Remove a file. Returns `false` when nothing was there.
    pub fn delete(&self, path: &str) -> bool {
        let Ok(key) = Self::key(path) else {
            return false;
        };
        let mut inner = self.write_lock();
        if inner.records.remove(&key).is_none() {
            return false;
        }
        inner.order.retain(|k| k != &key);
        debug!(path = %key, "Virtual file deleted");
        true
    }

    /// All files in first-insertion order.
    pub fn list(&self) -> Vec<FileRecord> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|key| inner.records.get(key).cloned())
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let store = VirtualFileStore::new();
        store.put("notes.txt", "héllo").unwrap();

        let record = store.get("notes.txt").unwrap();
        assert_eq!(record.content(), "héllo");
        assert_eq!(record.size(), 5);
        assert_eq!(record.path(), "notes.txt");
    }

    #[test]
    fn overwrite_keeps_one_record_and_created_at() {
        let store = VirtualFileStore::new();
        let first = store.write("a.txt", "one").unwrap();
        assert_eq!(first.kind, WriteKind::Created);

        let second = store.write("./a.txt", "second version").unwrap();
        assert_eq!(second.kind, WriteKind::Updated);

        assert_eq!(store.len(), 1);
        assert_eq!(store.list().len(), 1);
        let record = store.get("a.txt").unwrap();
        assert_eq!(record.content(), "second version");
        assert_eq!(record.size(), 14);
        assert_eq!(record.created_at(), first.record.created_at());
        assert!(record.updated_at() >= first.record.updated_at());
    }

    #[test]
    fn delete_existing_and_absent() {
        let store = VirtualFileStore::new();
        store.put("a.txt", "x").unwrap();
        store.put("b.txt", "y").unwrap();

        assert!(store.delete("a.txt"));
        assert!(store.get("a.txt").is_none());

        let before = store.list();
        assert!(!store.delete("a.txt"));
        assert!(!store.delete("../outside"));
        assert_eq!(store.list(), before);
    }

    #[test]
    fn list_is_insertion_ordered_and_stable() {
        let store = VirtualFileStore::new();
        store.put("z.txt", "1").unwrap();
        store.put("a.txt", "2").unwrap();
        store.put("m.txt", "3").unwrap();
        store.put("z.txt", "4").unwrap();

        let names: Vec<String> = store.list().iter().map(|r| r.path().to_string()).collect();
        assert_eq!(names, vec!["z.txt", "a.txt", "m.txt"]);
        assert_eq!(store.list(), store.list());
    }

    #[test]
    fn lookups_use_normalized_paths() {
        let store = VirtualFileStore::new();
        store.put("src\\App.jsx", "x").unwrap();
        assert!(store.contains("/src/App.jsx"));
        assert!(store.contains("./src//App.jsx"));
    }

    #[test]
    fn invalid_paths_are_rejected_on_put() {
        let store = VirtualFileStore::new();
        let err = store.put("../secret", "x").unwrap_err();
        assert!(err.to_string().contains("../secret"));
        assert!(store.put("", "x").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn record_serializes_listing_shape() {
        let store = VirtualFileStore::new();
        let record = store.put("index.html", "<p>hi</p>").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "index.html");
        assert_eq!(json["content"], "<p>hi</p>");
        assert_eq!(json["size"], 9);
        assert!(json["createdAt"].is_string());
    }
}
