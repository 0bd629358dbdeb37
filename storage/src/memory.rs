use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use storage_driver::{Driver, Metadata, StorageError, StorageErrorKind};

#[derive(Debug)]
struct MemoryFileItem {
    modified: DateTime<Utc>,
    data: Vec<u8>,
}

impl From<Vec<u8>> for MemoryFileItem {
    fn from(data: Vec<u8>) -> Self {
        Self {
            modified: Utc::now(),
            data,
        }
    }
}

impl From<&MemoryFileItem> for Metadata {
    fn from(value: &MemoryFileItem) -> Self {
        Self {
            modified: value.modified,
            size: value.data.len() as u64,
        }
    }
}

/// Storage driver that holds files in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<Utf8PathBuf, MemoryFileItem>>,
}

impl MemoryStorage {
    /// Create a new `MemoryStorage` instance, with no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new `MemoryStorage` instance, with the given files.
    pub fn with_files<P, D>(files: impl IntoIterator<Item = (P, D)>) -> Self
    where
        P: Into<Utf8PathBuf>,
        D: Into<Vec<u8>>,
    {
        let files: HashMap<Utf8PathBuf, MemoryFileItem> = files
            .into_iter()
            .map(|(path, data)| {
                let data: Vec<u8> = data.into();
                (path.into(), MemoryFileItem::from(data))
            })
            .collect();

        Self {
            files: RwLock::new(files),
        }
    }

    /// Add or replace a file.
    pub async fn insert(&self, path: impl Into<Utf8PathBuf>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        let mut files = self.files.write().await;
        files.insert(path.into(), MemoryFileItem::from(data));
    }
}

#[async_trait::async_trait]
impl Driver for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let files = self.files.read().await;
        Ok(files
            .get(remote)
            .ok_or_else(|| {
                StorageError::builder(
                    self.name(),
                    StorageErrorKind::NotFound,
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Path not found: {remote}"),
                    ),
                )
                .path(remote.as_str())
                .context("path not found")
                .build()
            })?
            .into())
    }
}
