// Persistent key/value store backing the cache.
// Durable JSON storage with get/set/remove/list, on disk or in memory.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{GtrendError, Result};

use super::paths;

/// Durable key to JSON value storage.
///
/// `set` may fail with [`GtrendError::QuotaExceeded`] when the backing storage
/// is full; callers are expected to log and continue.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn list_keys(&self) -> Result<Vec<String>>;
}

impl<T: PersistentStore + ?Sized> PersistentStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        (**self).list_keys()
    }
}

/// On-disk layout of a `FileStore` entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<K, V> {
    key: K,
    value: V,
}

/// Store that keeps one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the XDG cache location, if one can be determined.
    pub fn open_default() -> Option<Self> {
        paths::store_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = paths::entry_path(&self.dir, key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredEntry<String, Value> = serde_json::from_str(&contents)?;
        Ok(Some(stored.value))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let json = serde_json::to_string(&StoredEntry { key, value })?;
        fs::create_dir_all(&self.dir).map_err(|e| quota_or_io(e, key))?;

        let path = paths::entry_path(&self.dir, key);

        // Write atomically via temp file
        let temp_path = path.with_extension("tmp");
        let written = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &path));

        if let Err(e) = written {
            // A partial temp file would hold on to the space a full disk needs
            let _ = fs::remove_file(&temp_path);
            return Err(quota_or_io(e, key));
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(paths::entry_path(&self.dir, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            // Only the key is needed; the value is skipped as raw JSON
            let parsed = fs::read_to_string(&path)
                .map_err(GtrendError::from)
                .and_then(|contents| {
                    serde_json::from_str::<StoredEntry<String, serde::de::IgnoredAny>>(&contents)
                        .map_err(GtrendError::from)
                });
            match parsed {
                Ok(stored) => keys.push(stored.key),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable store file"),
            }
        }
        Ok(keys)
    }
}

fn quota_or_io(err: std::io::Error, key: &str) -> GtrendError {
    if err.kind() == ErrorKind::StorageFull {
        GtrendError::QuotaExceeded {
            key: key.to_string(),
        }
    } else {
        err.into()
    }
}

/// In-process store, optionally capped at a total number of serialized bytes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a raw string, bypassing JSON encoding. Lets tests plant corrupt entries.
    pub fn insert_raw(&self, key: &str, raw: &str) {
        self.lock().insert(key.to_string(), raw.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.lock().get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let mut entries = self.lock();

        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + raw.len() > quota {
                return Err(GtrendError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }

        entries.insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }
}
