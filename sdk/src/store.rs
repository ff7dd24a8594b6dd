//! Persistent record of completed deployments
//!
//! Records are JSON documents keyed by a logical name. A record that cannot be
//! read or parsed is reported as absent so callers fall back to deploying
//! from scratch.

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Name of the program deployment record.
pub const PROGRAM_RECORD: &str = "program";

/// Name of the register set deployment record.
pub const REGISTER_RECORD: &str = "abi";

// ================================
// Storage Backend Trait
// ================================

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the bytes stored under `name`, `None` if never written
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Replace whatever is stored under `name`
    async fn write(&self, name: &str, content: &[u8]) -> Result<()>;
}

// ================================
// Local File Storage
// ================================

/// One file per record inside a directory, created on first write.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn get_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(&['/', '\\'][..]) || name.starts_with('.') {
            return Err(DeployError::configuration(format!(
                "Invalid record name: {:?}",
                name
            )));
        }
        Ok(self.base_path.join(name))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.get_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, content: &[u8]) -> Result<()> {
        let path = self.get_path(name)?;
        tokio::fs::create_dir_all(&self.base_path).await?;

        // Write beside the target and rename so readers never see a partial record
        let tmp_path = self.base_path.join(format!(".{}.tmp", name));
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }
}

// ================================
// In-Memory Storage Backend
// ================================

/// In-memory storage backend for development and testing
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(name).cloned())
    }

    async fn write(&self, name: &str, content: &[u8]) -> Result<()> {
        self.data
            .write()
            .await
            .insert(name.to_string(), content.to_vec());
        Ok(())
    }
}

// ================================
// Typed Record Store
// ================================

/// JSON record store over any [`StorageBackend`].
#[derive(Clone)]
pub struct DeploymentStore {
    backend: Arc<dyn StorageBackend>,
}

impl DeploymentStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn local<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(Arc::new(LocalStorage::new(dir)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStorage::new()))
    }

    /// Load a record, treating unreadable or corrupt content as absent.
    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let content = match self.backend.read(name).await {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot read deployment record {}: {}", name, e);
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring corrupt deployment record {}: {}", name, e);
                None
            }
        }
    }

    /// Persist a record, replacing any previous value in full.
    pub async fn save<T: Serialize + ?Sized>(&self, name: &str, record: &T) -> Result<()> {
        let content = serde_json::to_vec(record)?;
        self.backend.write(name, &content).await
    }
}
