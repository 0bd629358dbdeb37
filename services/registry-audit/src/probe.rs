//! Physical presence checks for blob content.

use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use storage::Storage;

use crate::model::BlobId;

/// Storage path of a blob's content, relative to the storage root:
/// `<id[0:2]>/<id>/data`.
///
/// Returns `None` when the identifier is too short to have a shard directory.
pub fn blob_path(id: &BlobId) -> Option<Utf8PathBuf> {
    let shard = id.shard()?;
    let mut path = Utf8PathBuf::from(shard);
    path.push(id.as_str());
    path.push("data");
    Some(path)
}

/// Why a blob was classified as missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingReason {
    /// No file at the blob's path.
    NotFound,

    /// The file exists but has no content.
    Empty,

    /// The file could not be inspected.
    Unreadable(String),
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::NotFound => f.write_str("not found"),
            MissingReason::Empty => f.write_str("empty file"),
            MissingReason::Unreadable(error) => write!(f, "unreadable: {error}"),
        }
    }
}

/// Result of probing one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum Presence {
    /// Content is present and non-empty.
    Found {
        /// Size of the content, in bytes.
        size: u64,
    },

    /// Content is absent, empty or unreadable.
    Missing {
        /// What was wrong with the content.
        reason: MissingReason,
    },

    /// The blob identifier can't be mapped to a path, so nothing was checked.
    Skipped,
}

impl Presence {
    /// Whether the blob was classified missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, Presence::Missing { .. })
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Found { size } => write!(f, "found ({size} bytes)"),
            Presence::Missing { reason } => write!(f, "missing ({reason})"),
            Presence::Skipped => f.write_str("skipped"),
        }
    }
}

/// Checks whether blob content exists in storage.
#[derive(Debug, Clone)]
pub struct FilesystemProbe {
    storage: Storage,
}

impl FilesystemProbe {
    /// Create a probe reading from `storage`, which should be rooted at the
    /// directory holding the blob shard directories.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Classify the blob stored under `id`.
    ///
    /// Storage errors never escape: a blob that can't be inspected is
    /// reported missing, with the error as the reason.
    pub async fn exists(&self, id: &BlobId) -> Presence {
        let Some(path) = blob_path(id) else {
            tracing::trace!(%id, "Blob id too short to form a path");
            return Presence::Skipped;
        };

        match self.storage.metadata(&path).await {
            Ok(metadata) if metadata.is_empty() => {
                tracing::debug!(%id, %path, "Blob {id} is empty at {path}");
                Presence::Missing {
                    reason: MissingReason::Empty,
                }
            }
            Ok(metadata) => {
                tracing::debug!(
                    %id,
                    %path,
                    size = metadata.size,
                    modified = %metadata.modified,
                    "Blob {id} found at {path}"
                );
                Presence::Found {
                    size: metadata.size,
                }
            }
            Err(error) if error.is_not_found() => {
                tracing::debug!(%id, %path, "Blob {id} not found at {path}");
                Presence::Missing {
                    reason: MissingReason::NotFound,
                }
            }
            Err(error) => {
                tracing::debug!(
                    %id,
                    %path,
                    %error,
                    span_trace = %error.span_trace(),
                    "Blob {id} unreadable at {path}"
                );
                Presence::Missing {
                    reason: MissingReason::Unreadable(error.to_string()),
                }
            }
        }
    }
}
