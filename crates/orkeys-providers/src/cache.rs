use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use orkeys_types::ModelRecord;

use crate::clock::Clock;

pub const MODEL_CACHE_KEY: &str = "openrouter_models_cache";
pub const DEFAULT_MODEL_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Key/value persistence under the cache. Implementations may fail at any
/// time (disabled, full, unreadable); callers treat failures as a miss.
pub trait CacheStorage: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl CacheStorage for MemoryCacheStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("cache storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("cache storage lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("cache storage lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileCacheStorage {
    dir: PathBuf,
}

impl FileCacheStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// `<cache_dir>/orkeys`, or `.orkeys/cache` when the platform has none.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("orkeys"))
            .unwrap_or_else(|| PathBuf::from(".orkeys").join("cache"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{file}.json"))
    }
}

impl CacheStorage for FileCacheStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCacheEntry {
    pub models: Vec<ModelRecord>,
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
}

/// Single-slot cache of the last successful model fetch.
#[derive(Clone)]
pub struct ModelCache {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    key: String,
}

impl ModelCache {
    pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            key: MODEL_CACHE_KEY.to_string(),
        }
    }

    pub fn read(&self, ttl: Option<Duration>) -> Option<ModelCacheEntry> {
        let ttl_ms = i64::try_from(ttl.unwrap_or(DEFAULT_MODEL_CACHE_TTL).as_millis())
            .unwrap_or(i64::MAX);

        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("model cache read failed: {}", err);
                return None;
            }
        };

        let entry = match serde_json::from_str::<ModelCacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("discarding unreadable model cache entry: {}", err);
                self.clear();
                return None;
            }
        };

        let age = self.clock.now_ms().saturating_sub(entry.timestamp);
        if age > ttl_ms {
            tracing::debug!("model cache entry expired (age {} ms)", age);
            self.clear();
            return None;
        }
        Some(entry)
    }

    pub fn write(&self, models: &[ModelRecord]) {
        let entry = ModelCacheEntry {
            models: models.to_vec(),
            timestamp: self.clock.now_ms(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("failed to encode model cache entry: {}", err);
                return;
            }
        };
        if let Err(err) = self.storage.set(&self.key, &raw) {
            tracing::warn!("model cache write failed: {}", err);
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!("model cache clear failed: {}", err);
        }
    }
}
