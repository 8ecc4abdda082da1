//! The storage contract behind the session codec.
//!
//! A backend stores opaque envelope bytes under short alphanumeric storage
//! keys. It never sees session IDs, encryption keys, or plaintext.
//!
//! # Contract
//!
//! - `get` distinguishes an absent record (`Ok(None)`) from an empty one
//!   (`Ok(Some(vec![]))`).
//! - `put` is atomic from the caller's perspective: a later `get` returns
//!   either the previous record or the new one, never a partial write.
//! - `remove` succeeds when the record is already absent.
//! - `gc` is best-effort: one failed deletion does not stop the sweep, but the
//!   overall result reports the failure.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use crate::error::StorageError;

/// Key/value storage for encrypted session envelopes.
///
/// Implementations are shared across concurrent callers, hence `Send + Sync`.
/// Concurrent `put`s to the same key resolve as last-writer-wins.
pub trait SessionStore: Send + Sync {
    /// Fetch the record stored under `key`, or `None` if there is none.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `record` under `key`, replacing any previous record.
    fn put(&self, key: &str, record: &[u8]) -> Result<(), StorageError>;

    /// Delete the record under `key`. Absent keys are not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every record last modified more than `max_age` ago.
    ///
    /// Returns the number of records removed. If any eligible record could
    /// not be removed the sweep still visits the rest and then returns
    /// [`StorageError::PartialSweep`].
    ///
    /// The default implementation sweeps nothing, for backends that expire
    /// records natively.
    fn gc(&self, max_age: Duration) -> Result<usize, StorageError> {
        let _ = max_age;
        Ok(0)
    }
}

/// Returns `true` if `key` is a well-formed storage key: non-empty ASCII alphanumeric.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric())
}
