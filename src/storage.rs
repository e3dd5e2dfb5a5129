use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::AppError;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to serialize demo state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage io failed for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<PersistError> for AppError {
    fn from(error: PersistError) -> Self {
        match error {
            PersistError::Serialize(err) => {
                AppError::from(err).with_context("operation", "persist")
            }
            PersistError::Io { key, source } => AppError::new("STORAGE/IO", source.to_string())
                .with_context("key", key)
                .with_context("kind", format!("{:?}", source.kind())),
            PersistError::Unavailable(reason) => AppError::new("STORAGE/UNAVAILABLE", reason),
        }
    }
}

/// Minimal key/value contract shared by durable and session scopes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut guard = match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let mut guard = match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(key);
        Ok(())
    }
}

/// One file per key under a directory. Writes go through a temp file and an
/// exclusive lock so concurrent CLI invocations never observe a torn blob.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| PersistError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    fn lock_file(&self, key: &str) -> Result<File, PersistError> {
        let io_err = |source| PersistError::Io {
            key: key.to_string(),
            source,
        };
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(".lock"))
            .map_err(io_err)?;
        lock.lock_exclusive().map_err(io_err)?;
        Ok(lock)
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            key: key.to_string(),
            source,
        };
        let lock = self.lock_file(key)?;
        let target = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(io_err)?;
        tmp.write_all(value.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|err| io_err(err.error))?;
        lock.unlock().map_err(io_err)?;
        debug!(
            target: "boarding_mock",
            event = "storage_write",
            key,
            bytes = value.len()
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let lock = self.lock_file(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PersistError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        }
        lock.unlock().map_err(|source| PersistError::Io {
            key: key.to_string(),
            source,
        })?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct StorageHandle {
    inner: Arc<dyn KeyValueStore>,
}

impl StorageHandle {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::default())
    }

    pub fn file(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        Ok(Self::new(FileStorage::open(root)?))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.inner.set(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.inner.remove(key)
    }
}

/// The two storage scopes the store persists into: a durable one that
/// survives restarts and an ephemeral one bound to a single session.
#[derive(Clone)]
pub struct StorageScopes {
    pub durable: StorageHandle,
    pub session: StorageHandle,
}

impl StorageScopes {
    pub fn new(durable: StorageHandle, session: StorageHandle) -> Self {
        Self { durable, session }
    }

    pub fn in_memory() -> Self {
        Self::new(StorageHandle::in_memory(), StorageHandle::in_memory())
    }

    /// Start a new session against the same durable storage.
    pub fn new_session(&self) -> Self {
        Self::new(self.durable.clone(), StorageHandle::in_memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_storage_round_trips() {
        let handle = StorageHandle::in_memory();
        assert!(handle.get("k").is_none());
        handle.set("k", "v").expect("set");
        assert_eq!(handle.get("k").as_deref(), Some("v"));
        handle.remove("k").expect("remove");
        assert!(handle.get("k").is_none());
    }

    #[test]
    fn file_storage_overwrites_in_place() {
        let dir = tempdir().expect("tempdir");
        let storage = FileStorage::open(dir.path()).expect("open");
        storage.set("boarding_demo_data", "old").expect("first write");
        storage.set("boarding_demo_data", "new").expect("second write");
        assert_eq!(storage.get("boarding_demo_data").as_deref(), Some("new"));
        assert!(dir.path().join("boarding_demo_data.json").exists());
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let dir = tempdir().expect("tempdir");
        let storage = FileStorage::open(dir.path()).expect("open");
        storage.set("../escape", "x").expect("write");
        assert!(dir.path().join("___escape.json").exists());
        storage.remove("../escape").expect("remove");
        storage.remove("../escape").expect("remove twice is fine");
        assert!(storage.get("../escape").is_none());
    }

    #[test]
    fn new_session_shares_durable_scope() {
        let scopes = StorageScopes::in_memory();
        scopes.durable.set("a", "1").expect("durable");
        scopes.session.set("s", "1").expect("session");
        let next = scopes.new_session();
        assert_eq!(next.durable.get("a").as_deref(), Some("1"));
        assert!(next.session.get("s").is_none());
    }
}
