//! # Storage backends
//!
//! Configuration and unification for the read-only storage backends that
//! hold registry blob content.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

#[cfg(feature = "local")]
pub(crate) mod local;

pub(crate) mod memory;

#[cfg(feature = "local")]
#[doc(inline)]
pub use local::LocalDriver;

#[doc(inline)]
pub use memory::MemoryStorage;

#[doc(inline)]
pub use storage_driver::{Driver, Metadata, StorageError, StorageErrorKind};

/// Default location of blob content in a registry's storage volume.
pub const DEFAULT_BLOB_ROOT: &str = "/storage/docker/registry/v2/blobs/id";

/// Which storage backend to read blob content from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    /// An empty in-memory store, useful for dry runs.
    Memory,

    /// A directory on the local filesystem.
    #[cfg(feature = "local")]
    Local {
        /// Root directory holding the sharded blob directories.
        path: Utf8PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        #[cfg(feature = "local")]
        {
            StorageConfig::Local {
                path: Utf8PathBuf::from(DEFAULT_BLOB_ROOT),
            }
        }
        #[cfg(not(feature = "local"))]
        {
            StorageConfig::Memory
        }
    }
}

impl StorageConfig {
    /// Build the configured storage backend.
    #[tracing::instrument]
    pub async fn build(self) -> Result<Storage, StorageError> {
        let client: Storage = match self {
            StorageConfig::Memory => MemoryStorage::new().into(),
            #[cfg(feature = "local")]
            StorageConfig::Local { path } => LocalDriver::open(path).await?.into(),
        };
        Ok(client)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// A cloneable handle to a storage driver.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    /// Wrap a driver in a storage handle.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Get the metadata for a file, by path.
    #[tracing::instrument(level = "trace", skip(self), fields(driver=self.driver.name()))]
    pub async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.metadata(remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_config_builds() {
        let storage = StorageConfig::Memory.build().await.unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[test]
    fn config_deserializes() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"local": {"path": "/srv/blobs"}}"#).unwrap();
        assert_eq!(
            config,
            StorageConfig::Local {
                path: Utf8PathBuf::from("/srv/blobs")
            }
        );

        let config: StorageConfig = serde_json::from_str(r#""memory""#).unwrap();
        assert_eq!(config, StorageConfig::Memory);
    }

    #[tokio::test]
    async fn storage_handle_forwards_metadata() {
        let storage = Storage::from(MemoryStorage::with_files([(
            "ab/ab12/data",
            b"x".to_vec(),
        )]));
        let metadata = storage.metadata(Utf8Path::new("ab/ab12/data")).await.unwrap();
        assert_eq!(metadata.size, 1);
    }
}
