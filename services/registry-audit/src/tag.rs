//! Targeted check of the blobs behind a single tagged image.

use std::fmt::Write as _;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::context::AuditContext;
use crate::error::{AuditResult, NotFound};
use crate::metadata::ImageRef;
use crate::model::{BlobId, Digest};
use crate::probe::{Presence, blob_path};
use crate::report::OutputFormat;

/// Storage status of one blob of a checked image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobStatus {
    /// Content digest referenced by the manifest.
    pub digest: Digest,

    /// Storage id recorded for the digest.
    pub id: BlobId,

    /// Path of the content, relative to the storage root.
    pub path: Option<Utf8PathBuf>,

    /// What the probe found.
    pub presence: Presence,
}

/// Outcome of checking one tagged image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCheck {
    /// The checked image.
    pub image: ImageRef,

    /// Digest of the manifest the tag points at.
    pub manifest: Digest,

    /// Status of every blob the manifest references: config first, then layers.
    pub blobs: Vec<BlobStatus>,

    /// Number of blobs whose content is missing.
    pub missing: usize,
}

impl TagCheck {
    /// Whether every blob is present.
    pub fn is_clean(&self) -> bool {
        self.missing == 0
    }

    /// Render the check result.
    ///
    /// Text has one line per blob followed by the missing count.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Json => serde_json::to_string(self),
            OutputFormat::Text => {
                let mut out = String::new();
                for blob in &self.blobs {
                    let path = blob.path.as_ref().map(|p| p.as_str()).unwrap_or("-");
                    let _ = writeln!(
                        out,
                        "{} {} {} {}",
                        blob.digest, blob.id, path, blob.presence
                    );
                }
                let _ = writeln!(out, "missing: {}", self.missing);
                Ok(out)
            }
        }
    }
}

/// Check that every blob of `image` is present in storage.
///
/// Fails with [`NotFound`] if the tag, its manifest, or any referenced blob
/// record is absent from the metadata store. Missing blob content is not a
/// failure: every blob is probed and reported.
#[tracing::instrument(skip(ctx), fields(%image))]
pub async fn check_tag(ctx: &AuditContext, image: &ImageRef) -> AuditResult<TagCheck> {
    let metadata = ctx.metadata();

    let tag = metadata
        .tag(image)
        .await?
        .ok_or_else(|| NotFound::Tag(image.clone()))?;
    tracing::debug!(?tag, "Resolved tag");

    let manifest = metadata
        .manifest(&tag.digest)
        .await?
        .ok_or_else(|| NotFound::Manifest {
            image: image.clone(),
            digest: tag.digest.clone(),
        })?;
    tracing::debug!(?manifest, "Resolved manifest");

    let mut blobs = Vec::new();
    for digest in manifest.blob_digests() {
        let blob = metadata
            .blob(digest)
            .await?
            .ok_or_else(|| NotFound::Blob {
                image: image.clone(),
                digest: digest.clone(),
            })?;
        tracing::debug!(%digest, id = %blob.id, "Resolved blob");
        blobs.push(blob);
    }

    let mut statuses = Vec::with_capacity(blobs.len());
    for blob in blobs {
        let presence = ctx.probe().exists(&blob.id).await;
        let path = blob_path(&blob.id);
        match &presence {
            Presence::Missing { reason } => {
                tracing::error!(id = %blob.id, "Blob {} missing: {reason}", blob.id)
            }
            Presence::Found { .. } => tracing::info!(id = %blob.id, "Blob {} found", blob.id),
            Presence::Skipped => {
                tracing::warn!(id = %blob.id, "Blob id {} can't form a storage path", blob.id)
            }
        }
        statuses.push(BlobStatus {
            digest: blob.sha256sum,
            id: blob.id,
            path,
            presence,
        });
    }

    let missing = statuses
        .iter()
        .filter(|status| status.presence.is_missing())
        .count();
    tracing::info!("Missing blob count: {missing}");

    Ok(TagCheck {
        image: image.clone(),
        manifest: manifest.digest,
        blobs: statuses,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::metadata::{MemoryMetadata, MetadataTables};
    use crate::model::{BlobRecord, LayerRecord, ManifestRecord, TagRecord};
    use crate::probe::MissingReason;
    use storage::MemoryStorage;

    fn tables() -> MetadataTables {
        MetadataTables {
            blobs: vec![
                BlobRecord::new("sha256:cfg", "cf01", "config"),
                BlobRecord::new("sha256:l1", "aa01", "layer"),
                BlobRecord::new("sha256:l2", "bb01", "layer"),
            ],
            manifests: vec![ManifestRecord::new("org/app@sha256:m", "sha256:m", "org/app")
                .with_config("sha256:cfg")
                .with_layer(LayerRecord::new("sha256:l1", 10, "layer"))
                .with_layer(LayerRecord::new("sha256:l2", 20, "layer"))],
            tags: vec![TagRecord::new("org/app", "latest", "sha256:m")],
            ..Default::default()
        }
    }

    fn context(tables: MetadataTables) -> AuditContext {
        let storage = MemoryStorage::with_files([
            ("cf/cf01/data", b"{}".to_vec()),
            ("bb/bb01/data", Vec::new()),
        ]);
        AuditContext::new(MemoryMetadata::new(tables), storage.into())
    }

    #[tokio::test]
    async fn probes_every_blob() {
        let ctx = context(tables());
        let check = check_tag(&ctx, &ImageRef::new("org", "app", "latest"))
            .await
            .unwrap();

        assert_eq!(check.manifest.as_str(), "sha256:m");
        assert_eq!(check.missing, 2);
        assert!(!check.is_clean());

        let presences: Vec<_> = check
            .blobs
            .iter()
            .map(|status| (status.id.as_str(), status.presence.clone()))
            .collect();
        assert_eq!(
            presences,
            [
                ("cf01", Presence::Found { size: 2 }),
                (
                    "aa01",
                    Presence::Missing {
                        reason: MissingReason::NotFound
                    }
                ),
                (
                    "bb01",
                    Presence::Missing {
                        reason: MissingReason::Empty
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn renders_text_status() {
        let ctx = context(tables());
        let check = check_tag(&ctx, &ImageRef::new("org", "app", "latest"))
            .await
            .unwrap();

        let text = check.render(OutputFormat::Text).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "sha256:cfg cf01 cf/cf01/data found (2 bytes)",
                "sha256:l1 aa01 aa/aa01/data missing (not found)",
                "sha256:l2 bb01 bb/bb01/data missing (empty file)",
                "missing: 2",
            ]
        );
    }

    #[tokio::test]
    async fn absent_tag_is_not_found() {
        let ctx = context(tables());
        let image = ImageRef::new("org", "app", "nightly");
        let error = check_tag(&ctx, &image).await.unwrap_err();
        assert!(matches!(error, AuditError::NotFound(NotFound::Tag(ref i)) if *i == image));
    }

    #[tokio::test]
    async fn absent_manifest_is_not_found() {
        let mut tables = tables();
        tables.manifests.clear();
        let ctx = context(tables);

        let error = check_tag(&ctx, &ImageRef::new("org", "app", "latest"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AuditError::NotFound(NotFound::Manifest { .. })
        ));
    }

    #[tokio::test]
    async fn absent_blob_record_is_not_found() {
        let mut tables = tables();
        tables.blobs.retain(|blob| blob.sha256sum.as_str() != "sha256:l2");
        let ctx = context(tables);

        let error = check_tag(&ctx, &ImageRef::new("org", "app", "latest"))
            .await
            .unwrap_err();
        match error {
            AuditError::NotFound(NotFound::Blob { digest, .. }) => {
                assert_eq!(digest.as_str(), "sha256:l2")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
