//! Key/value persistence for the offline queue.
//!
//! The queue only needs four primitives, captured by [`KeyValueStore`]. Each
//! call is an atomic unit: a value is either fully written or not at all.
//!
//! Two implementations live here:
//! - [`MemoryStore`] for tests and short-lived hosts
//! - [`FileStore`], a single JSON document on disk that survives restarts
//!
//! Hosts with a database can provide their own (the agent uses SQLite).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{error::Result, Error};

/// Version of the on-disk file format for future compatibility.
pub const FILE_FORMAT_VERSION: u32 = 1;

/// Minimal asynchronous key/value store.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the value stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// All keys currently stored.
    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>>>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        (**self).get(key)
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        (**self).set(key, value)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        (**self).delete(key)
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        (**self).keys()
    }
}

fn poisoned() -> Error {
    Error::Storage("store lock poisoned".into())
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            Ok(entries.get(key).cloned())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            entries.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            entries.remove(key);
            Ok(())
        })
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            Ok(entries.keys().cloned().collect())
        })
    }
}

// ============================================================================
// File
// ============================================================================

/// The JSON document a [`FileStore`] writes.
///
/// Uses BTreeMap so the file contents are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFile {
    /// File format version
    pub format_version: u32,
    /// Stored entries
    pub entries: BTreeMap<String, String>,
}

impl StoreFile {
    fn empty() -> Self {
        Self {
            format_version: FILE_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Deserialize from JSON, rejecting formats newer than this build.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidStoreFile(e.to_string()))?;

        if file.format_version > FILE_FORMAT_VERSION {
            return Err(Error::InvalidStoreFile(format!(
                "unsupported store format version: {} (max supported: {})",
                file.format_version, FILE_FORMAT_VERSION
            )));
        }

        Ok(file)
    }
}

/// Durable store backed by one JSON file.
///
/// The whole document is cached in memory; every mutation rewrites it to a
/// temporary sibling, fsyncs, then renames it over the original.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: tokio::sync::Mutex<StoreFile>,
}

impl FileStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(json) if json.trim().is_empty() => StoreFile::empty(),
            Ok(json) => StoreFile::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::empty(),
            Err(e) => return Err(Error::Storage(e.to_string())),
        };

        tracing::debug!(
            path = %path.display(),
            entries = state.entries.len(),
            "opened file store"
        );

        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreFile) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("tmp");

        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            tokio::io::AsyncWriteExt::write_all(&mut file, json.as_bytes()).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        };

        write.await.map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist store");
            Error::Storage(e.to_string())
        })
    }

    /// Apply `mutate` to a copy of the document and persist it; the cached
    /// document only changes once the write succeeded.
    async fn mutate(&self, mutate: impl FnOnce(&mut StoreFile)) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        mutate(&mut next);
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.state.lock().await.entries.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.mutate(|file| {
                file.entries.insert(key.to_string(), value);
            })
            .await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.state.lock().await.entries.contains_key(key) {
                return Ok(());
            }
            self.mutate(|file| {
                file.entries.remove(key);
            })
            .await
        })
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move { Ok(self.state.lock().await.entries.keys().cloned().collect()) })
    }
}
