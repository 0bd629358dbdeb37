//! Full scan for blobs whose content is missing from storage.

use serde::{Deserialize, Serialize};

use crate::context::AuditContext;
use crate::error::AuditResult;
use crate::index::DigestIndex;
use crate::metadata::BlobFilter;
use crate::model::BlobRecord;
use crate::probe::FilesystemProbe;

/// How a report is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// Line oriented text.
    #[default]
    Text,

    /// JSON.
    Json,
}

/// A missing blob, with the images that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedBlob {
    /// The blob record.
    #[serde(flatten)]
    pub blob: BlobRecord,

    /// `repository:tag` identifiers referencing the blob, sorted. Empty if
    /// no tagged manifest references it.
    #[serde(rename = "Repositories", default)]
    pub repositories: Vec<String>,
}

/// Probe every blob in order, returning those whose content is missing.
///
/// Blobs whose id can't form a storage path are skipped, not reported.
#[tracing::instrument(skip_all, fields(blobs = blobs.len()))]
pub async fn scan(probe: &FilesystemProbe, blobs: &[BlobRecord]) -> Vec<BlobRecord> {
    let total = blobs.len();
    let step = (total / 10).max(1);
    tracing::info!("Scanning storage for {total} blobs");

    let mut missing = Vec::new();
    for (idx, blob) in blobs.iter().enumerate() {
        if idx % step == 0 {
            tracing::info!("Checking blob {} of {}", idx + 1, total);
        }

        if probe.exists(&blob.id).await.is_missing() {
            missing.push(blob.clone());
        }
    }

    tracing::info!("Missing blobs found: {}", missing.len());
    missing
}

/// Attach the referencing images to each missing blob.
///
/// Blobs the index doesn't know are kept, with no repositories.
pub fn attribute(missing: Vec<BlobRecord>, index: &DigestIndex) -> Vec<AttributedBlob> {
    missing
        .into_iter()
        .map(|blob| {
            let repositories = match index.get(&blob.sha256sum) {
                Some(images) => images.iter().cloned().collect(),
                None => {
                    tracing::warn!(
                        id = %blob.id,
                        digest = %blob.sha256sum,
                        media_type = %blob.media_type,
                        "Could not find repository for blob {} sha {}",
                        blob.id,
                        blob.sha256sum
                    );
                    Vec::new()
                }
            };
            AttributedBlob { blob, repositories }
        })
        .collect()
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingBlobReport {
    /// Number of blob records scanned.
    pub scanned: usize,

    /// Missing blobs, in scan order.
    pub blobs: Vec<AttributedBlob>,
}

impl MissingBlobReport {
    /// Whether no blob is missing.
    pub fn is_clean(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Every `repository:tag` affected by a missing blob, sorted and deduplicated.
    pub fn affected_images(&self) -> Vec<&str> {
        let mut images: Vec<&str> = self
            .blobs
            .iter()
            .flat_map(|blob| blob.repositories.iter().map(String::as_str))
            .collect();
        images.sort_unstable();
        images.dedup();
        images
    }

    /// Render the report.
    ///
    /// Text is one affected image per line. JSON is an array with one object
    /// per missing blob.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(self
                .affected_images()
                .into_iter()
                .map(|image| format!("{image}\n"))
                .collect()),
            OutputFormat::Json => serde_json::to_string(&self.blobs),
        }
    }
}

/// Scan blob storage for every blob matching `filter` and attribute the
/// missing ones to the images that use them.
#[tracing::instrument(skip(ctx), fields(store = ctx.metadata().name()))]
pub async fn find_missing_blobs(
    ctx: &AuditContext,
    filter: &BlobFilter,
) -> AuditResult<MissingBlobReport> {
    tracing::info!("Reading blobs table");
    let blobs = ctx.metadata().load_blobs(filter).await?;
    let missing = scan(ctx.probe(), &blobs).await;

    if missing.is_empty() {
        return Ok(MissingBlobReport {
            scanned: blobs.len(),
            blobs: Vec::new(),
        });
    }

    tracing::info!("Reading manifests table");
    let manifests = ctx.metadata().load_manifests().await?;
    let index = DigestIndex::build(ctx.metadata(), &manifests).await?;

    Ok(MissingBlobReport {
        scanned: blobs.len(),
        blobs: attribute(missing, &index),
    })
}
