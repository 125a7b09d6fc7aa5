//! Durable storage backends for the registry

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::registry::models::Registry;

/// Trait for registry storage backends
///
/// Implementations must make `save` atomic: a reader of the durable copy
/// sees either the previous document or the new one, never a partial write.
#[async_trait]
pub trait RegistryStorage: Send + Sync {
    /// Load the persisted registry, `None` if nothing has been saved yet
    async fn load(&self) -> Result<Option<Registry>>;

    /// Replace the persisted registry
    async fn save(&self, registry: &Registry) -> Result<()>;
}

/// JSON document on the local filesystem
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<Registry>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted registry found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let registry = serde_json::from_slice(&bytes)?;
        Ok(Some(registry))
    }

    async fn save(&self, registry: &Registry) -> Result<()> {
        let json = serde_json::to_vec_pretty(registry)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file, then rename over the target
        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), "Persisted registry");
        Ok(())
    }
}

/// Keeps the last saved registry in process memory
#[derive(Default)]
pub struct MemoryStorage {
    saved: Mutex<Option<Registry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already persisted registry
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            saved: Mutex::new(Some(registry)),
        }
    }

    /// The last saved snapshot
    pub fn snapshot(&self) -> Option<Registry> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl RegistryStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<Registry>> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, registry: &Registry) -> Result<()> {
        *self.saved.lock() = Some(registry.clone());
        Ok(())
    }
}

/// Map a storage failure to the error reported after an in-memory mutation
pub(crate) fn persistence_error(err: AppError) -> AppError {
    match err {
        AppError::Persistence(_) => err,
        other => AppError::Persistence(other.to_string()),
    }
}
