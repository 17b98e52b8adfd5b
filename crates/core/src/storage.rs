//! Key-value storage backing the identity store.
//!
//! In a browser this is tab-scoped storage. Outside one, `FileStorage`
//! keeps a small JSON document on disk so identity survives restarts, and
//! `MemoryStorage` lasts for the life of the process.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result, StorageErrorCode};

/// String key-value storage.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage persisted as a JSON object in a single file.
///
/// Every write rewrites the whole file. The document holds a handful of
/// keys, so this stays cheap.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::storage(
                    StorageErrorCode::Corrupt,
                    format!("{}: {}", self.path.display(), e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(Error::storage(
                StorageErrorCode::Unavailable,
                format!("{}: {}", self.path.display(), e),
            )),
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec(entries)?;
        std::fs::write(&self.path, bytes).map_err(|e| {
            Error::storage(
                StorageErrorCode::Unavailable,
                format!("{}: {}", self.path.display(), e),
            )
        })
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }
}

/// Storage that is switched off. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl Storage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::storage(StorageErrorCode::Unavailable, "storage disabled"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::storage(StorageErrorCode::Unavailable, "storage disabled"))
    }
}
