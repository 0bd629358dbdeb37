//! Error types for audit runs

use std::io;

use crate::metadata::{ImageRef, MetadataError};
use crate::model::Digest;

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors which abort an audit run
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The metadata store could not be read
    #[error("metadata store: {0}")]
    Metadata(#[from] MetadataError),

    /// A record required by a targeted check does not exist
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// The report could not be serialized
    #[error("rendering report: {0}")]
    Render(#[from] serde_json::Error),

    /// The report could not be written
    #[error("writing output to {target}: {source}")]
    Output {
        /// Where the output was going
        target: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// A metadata record needed by a targeted check is absent.
///
/// Distinct from a blob whose content is missing on disk, which is the
/// finding a check reports rather than a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    /// No tag record for the image
    #[error("tag not found: {0}")]
    Tag(ImageRef),

    /// The tag points at a manifest which is not recorded
    #[error("manifest {digest} for {image} not found")]
    Manifest {
        /// Image being checked
        image: ImageRef,
        /// Digest the tag points at
        digest: Digest,
    },

    /// The manifest references a blob with no blob record
    #[error("blob record for {digest} in {image} not found")]
    Blob {
        /// Image being checked
        image: ImageRef,
        /// Digest of the unrecorded blob
        digest: Digest,
    },
}
