//! The collaborators an audit run works with.

use storage::Storage;

use crate::metadata::MetadataReader;
use crate::probe::FilesystemProbe;

/// Everything an audit workflow needs: where to read metadata from and how
/// to probe blob storage. Passed explicitly into each workflow.
#[derive(Debug, Clone)]
pub struct AuditContext {
    metadata: MetadataReader,
    probe: FilesystemProbe,
}

impl AuditContext {
    /// Create a context from a metadata backend and blob storage.
    pub fn new(metadata: impl Into<MetadataReader>, storage: Storage) -> Self {
        Self {
            metadata: metadata.into(),
            probe: FilesystemProbe::new(storage),
        }
    }

    /// The metadata store.
    pub fn metadata(&self) -> &MetadataReader {
        &self.metadata
    }

    /// The blob storage probe.
    pub fn probe(&self) -> &FilesystemProbe {
        &self.probe
    }
}
