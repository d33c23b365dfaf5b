//! Storage collaborator: opaque async key-value store.
//!
//! Session and wallet metadata round-trip through `serde_json::Value`; the
//! store has no schema beyond that. Two implementations ship with the crate:
//!
//! | Type | Backing | Use |
//! |------|---------|-----|
//! | [`MemoryStorage`] | `HashMap` | tests, ephemeral hosts |
//! | [`FileStorage`] | one JSON file per app | CLI / server |

use crate::error::{ConnectError, ConnectResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> ConnectResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> ConnectResult<()>;
    async fn remove(&self, key: &str) -> ConnectResult<()>;
    async fn clear(&self) -> ConnectResult<()>;
}

/// Typed read through any [`Storage`].
pub async fn get_typed<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> ConnectResult<Option<T>> {
    match storage.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Typed write through any [`Storage`].
pub async fn set_typed<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> ConnectResult<()> {
    storage.set(key, serde_json::to_value(value)?).await
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> ConnectResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> ConnectResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> ConnectResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> ConnectResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// JSON object on disk at `<root>/<app>/data/storage.json`.
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    pub fn open(app: &str) -> ConnectResult<Self> {
        Ok(Self::at(data_dir(app).join("storage.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: tokio::sync::Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ConnectResult<Map<String, Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(ConnectError::Storage(format!("read {}: {e}", self.path.display()))),
        }
    }

    async fn save(&self, entries: &Map<String, Value>) -> ConnectResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConnectError::Storage(format!("mkdir: {e}")))?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| ConnectError::Storage(format!("write: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ConnectError::Storage(format!("rename: {e}")))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> ConnectResult<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> ConnectResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> ConnectResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> ConnectResult<()> {
        let _guard = self.lock.lock().await;
        self.save(&Map::new()).await
    }
}

/// `<root>/<app>/data`, root from `BEECONNECT_ROOT` or the platform data dir.
pub fn data_dir(app: &str) -> PathBuf {
    let root = std::env::var("BEECONNECT_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
    root.join(app).join("data")
}
