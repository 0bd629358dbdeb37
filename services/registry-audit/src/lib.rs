//! # Registry blob audit
//!
//! Consistency checks between a container registry's metadata store and the
//! blob content in its storage volume.
//!
//! Two workflows are provided:
//!
//! - [`find_missing_blobs`] scans every recorded blob (optionally only those
//!   linked to one organization or repository), finds the ones whose content
//!   is absent or empty on disk, and attributes each to the `repository:tag`
//!   images that reference it.
//! - [`check_tag`] resolves a single tagged image to its config and layer
//!   blobs and reports the storage status of each.
//!
//! Both are strictly read-only.
//!
//! ## Example
//!
//! ```no_run
//! use registry_audit::{AuditContext, BlobFilter, OutputFormat, find_missing_blobs};
//! use registry_audit::metadata::SnapshotMetadata;
//! use camino::Utf8Path;
//! use storage::LocalDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metadata = SnapshotMetadata::open(Utf8Path::new("/out/export"), "dtr2").await?;
//! let storage = LocalDriver::open("/storage/docker/registry/v2/blobs/id".into()).await?;
//! let ctx = AuditContext::new(metadata, storage.into());
//!
//! let report = find_missing_blobs(&ctx, &BlobFilter::all().org("engineering")).await?;
//! print!("{}", report.render(OutputFormat::Text)?);
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod index;
mod probe;
mod report;
mod tag;

pub mod config;
pub mod metadata;
pub mod model;
pub mod output;

pub use context::AuditContext;
pub use error::{AuditError, AuditResult, NotFound};
pub use index::DigestIndex;
pub use metadata::{BlobFilter, ImageRef, MetadataReader};
pub use probe::{FilesystemProbe, MissingReason, Presence, blob_path};
pub use report::{
    AttributedBlob, MissingBlobReport, OutputFormat, attribute, find_missing_blobs, scan,
};
pub use tag::{BlobStatus, TagCheck, check_tag};
