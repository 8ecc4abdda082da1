//! Error type shared by every [`SessionStore`](crate::storage::SessionStore) backend.

use thiserror::Error;

/// Failure reported by a storage backend.
///
/// A missing record is never an error: `get` returns `Ok(None)` and `remove`
/// returns `Ok(())` for absent keys.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage key is not a non-empty alphanumeric token.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// The underlying medium failed (filesystem, database, cache).
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend-specific failure that has no `io::Error` representation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A gc sweep ran to completion but some eligible records could not be removed.
    #[error("gc sweep incomplete: removed {removed}, failed {failed}")]
    PartialSweep {
        /// Records successfully removed.
        removed: usize,
        /// Eligible records whose removal failed.
        failed: usize,
    },
}

impl StorageError {
    /// Returns `true` if the error came from a gc sweep that only partially succeeded.
    pub fn is_partial_sweep(&self) -> bool {
        matches!(self, StorageError::PartialSweep { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sweep_display_includes_counts() {
        let e = StorageError::PartialSweep {
            removed: 3,
            failed: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains("removed 3"));
        assert!(msg.contains("failed 1"));
        assert!(e.is_partial_sweep());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: StorageError = io.into();
        assert!(matches!(e, StorageError::Io(_)));
        assert!(!e.is_partial_sweep());
    }
}
