//! State store seam.
//!
//! The engine persists one serialized JSON blob per state key through an
//! opaque read/write pair: no transactions, no partial reads, and a missing
//! key is a normal "not yet initialized" condition. The blob is read in full
//! and written in full on every operation.
//!
//! Concurrency note: two writers racing on the same key are last-writer-wins.
//! A concurrent-safe deployment needs a version-conditioned write (CAS with
//! bounded retry) at this layer, or a single owner per key; neither is
//! provided by the backends here.

use std::collections::HashMap;
use std::path::PathBuf;

use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis store: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("file store: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque blob storage for the engine's aggregate.
#[allow(async_fn_in_trait)]
pub trait StateStore: Send + Sync {
    /// Read the blob at `key`. `None` means "not yet initialized".
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the blob at `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Redis-backed store using a lazily established connection manager.
///
/// Unlike a cache, this store is authoritative: failures propagate to the
/// caller instead of degrading to a miss. The cached connection is dropped on
/// failure so the next call reconnects.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<redis::aio::ConnectionManager>>,
}

impl RedisStore {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<redis::aio::ConnectionManager, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_connection_manager().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn drop_connection(&self) {
        *self.connection.lock().await = None;
    }
}

impl StateStore for RedisStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!("redis read failed: {err}");
                self.drop_connection().await;
                Err(err.into())
            }
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        match conn.set::<_, _, ()>(key, value).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!("redis write failed: {err}");
                self.drop_connection().await;
                Err(err.into())
            }
        }
    }
}

/// File-backed fallback store: one JSON file per key under a base directory.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so readers never observe a partial blob.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are logical identifiers, not paths; keep them filename-safe.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl StateStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

/// In-memory store for tests and local demos.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.blobs.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Runtime-selected backend, chosen once at deployment from configuration.
pub enum StoreBackend {
    Redis(RedisStore),
    File(FileStore),
    Memory(MemoryStore),
}

impl StateStore for StoreBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Redis(store) => store.read(key).await,
            Self::File(store) => store.read(key).await,
            Self::Memory(store) => store.read(key).await,
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            Self::Redis(store) => store.write(key, value).await,
            Self::File(store) => store.write(key, value).await,
            Self::Memory(store) => store.write(key, value).await,
        }
    }
}

impl<S: StateStore> StateStore for std::sync::Arc<S> {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.as_ref().read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.as_ref().write(key, value).await
    }
}
