use std::{fmt, ops::Deref, sync::Arc};

use camino::Utf8Path;
use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// File object metadata, which will be generically provided by the driver.
///
/// This struct only provides common metadata fields, and drivers may provide more specific
/// metadata fields directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// The size of the file in bytes.
    pub size: u64,

    /// The last modification timestamp of the file.
    pub modified: DateTime<Utc>,
}

impl Metadata {
    /// Whether the file has no content.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A read-only storage driver, which can report on files held by a storage backend.
///
/// Paths are relative to the root the driver was configured with.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Get the metadata for a file, by path.
    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError>;
}

#[async_trait::async_trait]
impl<D> Driver for Arc<D>
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.deref().metadata(remote).await
    }
}

#[async_trait::async_trait]
impl<D> Driver for &D
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        (**self).metadata(remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_obj_safe!(Driver);

    #[test]
    fn empty_metadata() {
        let metadata = Metadata {
            size: 0,
            modified: Utc::now(),
        };
        assert!(metadata.is_empty());
    }
}
