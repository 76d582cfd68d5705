//! Small best-effort key-value blob storage
//!
//! Failures are logged and swallowed here; callers treat a missing value the
//! same as one that could not be read.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// String blobs addressed by key
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String);
    async fn remove(&self, key: &str);
}

/// One file per key inside a directory
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    async fn write(&self, path: &Path, value: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write next to the target and rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read {:?}: {}", path, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String) {
        let path = self.path_for(key);
        if let Err(e) = self.write(&path, &value).await {
            warn!("Failed to write {:?}: {}", path, e);
        }
    }

    async fn remove(&self, key: &str) {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }
}

/// Process-local store, mostly for tests
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a value, e.g. a blob written by an earlier run.
    pub fn with_value(self, key: &str, value: impl Into<String>) -> Self {
        self.values.lock().insert(key.to_string(), value.into());
        self
    }

    /// Synchronous peek at the stored value.
    pub fn snapshot(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.values.lock().insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }
}
