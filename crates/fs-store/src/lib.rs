//! Filesystem-backed [`SessionStore`].
//!
//! Each envelope lives in its own file, `<root>/sess_<storage key>`. Storage
//! keys are alphanumeric, so the path needs no escaping and cannot leave
//! `root`.
//!
//! # Guarantees
//!
//! - `put` writes a temporary file in `root` and renames it over the record,
//!   so readers see the old record or the new one, never a partial write.
//! - Record files are readable and writable by the owner only (`0600` on Unix).
//! - `gc` removes `sess_*` files whose modification time is older than the
//!   max age. A failed removal is logged and counted; the sweep continues.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use common::{storage::is_valid_key, SessionStore, StorageError};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File name prefix of every record.
pub const RECORD_PREFIX: &str = "sess_";

/// Session envelope store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory records are stored in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] unless `key` is non-empty ASCII alphanumeric.
    pub fn record_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(format!("{RECORD_PREFIX}{key}")))
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.record_path(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, record: &[u8]) -> Result<(), StorageError> {
        let path = self.record_path(key)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        restrict_to_owner(tmp.as_file())?;
        tmp.write_all(record)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.record_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn gc(&self, max_age: Duration) -> Result<usize, StorageError> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut failed = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "failed to read session directory entry");
                    failed += 1;
                    continue;
                }
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.starts_with(RECORD_PREFIX) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(record = name, error = %e, "failed to stat session record");
                    failed += 1;
                    continue;
                }
            };
            // Future mtimes (clock skew) count as fresh.
            let stale = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if !stale {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(record = name, error = %e, "failed to remove stale session record");
                    failed += 1;
                }
            }
        }

        debug!(removed, failed, "session gc sweep finished");
        if failed > 0 {
            return Err(StorageError::PartialSweep { removed, failed });
        }
        Ok(removed)
    }
}

#[cfg(unix)]
fn restrict_to_owner(file: &fs::File) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_file: &fs::File) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("sessions")).unwrap();
        (dir, store)
    }

    fn backdate(path: &Path, by: Duration) {
        let file = fs::File::open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    fn entries(store: &FileStore) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn put_get_remove() {
        let (_dir, store) = store();
        assert_eq!(store.get("abc").unwrap(), None);

        store.put("abc", b"envelope").unwrap();
        assert_eq!(store.get("abc").unwrap().as_deref(), Some(&b"envelope"[..]));

        store.remove("abc").unwrap();
        assert_eq!(store.get("abc").unwrap(), None);
        store.remove("abc").unwrap();
    }

    #[test]
    fn empty_record_is_present() {
        let (_dir, store) = store();
        store.put("empty", b"").unwrap();
        assert_eq!(store.get("empty").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn put_replaces_without_leaving_temp_files() {
        let (_dir, store) = store();
        store.put("abc", b"one").unwrap();
        store.put("abc", b"two").unwrap();
        assert_eq!(store.get("abc").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(entries(&store), vec!["sess_abc".to_owned()]);
    }

    #[test]
    fn rejects_path_like_keys() {
        let (_dir, store) = store();
        for key in ["../escape", "a/b", "", "dot.dot"] {
            assert!(matches!(
                store.put(key, b"x"),
                Err(StorageError::InvalidKey(_))
            ));
        }
        assert!(entries(&store).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn records_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.put("abc", b"envelope").unwrap();
        let mode = fs::metadata(store.record_path("abc").unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn gc_removes_stale_and_keeps_fresh() {
        let (_dir, store) = store();
        store.put("old1", b"a").unwrap();
        store.put("old2", b"b").unwrap();
        store.put("fresh", b"c").unwrap();
        backdate(&store.record_path("old1").unwrap(), Duration::from_secs(7200));
        backdate(&store.record_path("old2").unwrap(), Duration::from_secs(3600));

        // Foreign files are never swept, however old.
        let foreign = store.root().join("README");
        fs::write(&foreign, b"keep me").unwrap();
        backdate(&foreign, Duration::from_secs(86_400));

        assert_eq!(store.gc(Duration::from_secs(1440)).unwrap(), 2);
        assert_eq!(entries(&store), vec!["README".to_owned(), "sess_fresh".to_owned()]);
    }

    #[test]
    fn gc_continues_past_failed_removal() {
        let (_dir, store) = store();
        store.put("old1", b"a").unwrap();
        store.put("old2", b"b").unwrap();
        store.put("fresh", b"c").unwrap();
        backdate(&store.record_path("old1").unwrap(), Duration::from_secs(7200));
        backdate(&store.record_path("old2").unwrap(), Duration::from_secs(7200));

        // A directory in a record slot cannot be removed with remove_file,
        // even by a privileged user.
        let stuck = store.root().join("sess_stuck");
        fs::create_dir(&stuck).unwrap();
        fs::write(stuck.join("inner"), b"x").unwrap();
        backdate(&stuck, Duration::from_secs(7200));

        let err = store.gc(Duration::from_secs(1440)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::PartialSweep {
                removed: 2,
                failed: 1
            }
        ));
        assert_eq!(
            entries(&store),
            vec!["sess_fresh".to_owned(), "sess_stuck".to_owned()]
        );
    }

    #[test]
    fn open_creates_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let store = FileStore::open(&root).unwrap();
        assert!(store.root().is_dir());
    }
}
