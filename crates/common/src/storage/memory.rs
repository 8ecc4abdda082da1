//! [`MemoryStore`]: process-local [`SessionStore`] used by tests and embedders.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::RwLock;

use super::{is_valid_key, SessionStore};
use crate::error::StorageError;

#[derive(Debug, Clone)]
struct Record {
    bytes: Vec<u8>,
    modified: SystemTime,
}

/// In-memory store keyed by storage key.
///
/// Clones share the same underlying map, so a clone handed to a codec can
/// still be inspected by the test that created it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Record>>>,
}

impl MemoryStore {
    /// Create a new, empty [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// All storage keys currently held, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Store `record` with an explicit modification time.
    ///
    /// Lets callers backdate records to exercise [`SessionStore::gc`].
    pub fn put_with_mtime(
        &self,
        key: &str,
        record: &[u8],
        modified: SystemTime,
    ) -> Result<(), StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        self.inner.write().insert(
            key.to_owned(),
            Record {
                bytes: record.to_vec(),
                modified,
            },
        );
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.inner.read().get(key).map(|r| r.bytes.clone()))
    }

    fn put(&self, key: &str, record: &[u8]) -> Result<(), StorageError> {
        self.put_with_mtime(key, record, SystemTime::now())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        self.inner.write().remove(key);
        Ok(())
    }

    fn gc(&self, max_age: Duration) -> Result<usize, StorageError> {
        let now = SystemTime::now();
        let mut map = self.inner.write();
        let before = map.len();
        // Records with a modification time in the future count as fresh.
        map.retain(|_, r| {
            now.duration_since(r.modified)
                .map(|age| age <= max_age)
                .unwrap_or(true)
        });
        Ok(before - map.len())
    }
}
