//! Attribution of blob digests to the tagged images that reference them.

use std::collections::{BTreeSet, HashMap};

use crate::metadata::{MetadataError, MetadataReader};
use crate::model::{Digest, ManifestRecord};

/// Map from blob digest to every `repository:tag` whose manifest references it.
///
/// Blob storage is content addressed, so one layer is routinely shared by many
/// images; each digest maps to a set, and duplicate references collapse.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DigestIndex {
    entries: HashMap<Digest, BTreeSet<String>>,
}

impl DigestIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from `manifests`, resolving each manifest to its tag.
    ///
    /// Manifests that no tag references are skipped. Failing to query the
    /// metadata store aborts the build.
    #[tracing::instrument(skip_all, fields(manifests = manifests.len()))]
    pub async fn build(
        reader: &MetadataReader,
        manifests: &[ManifestRecord],
    ) -> Result<Self, MetadataError> {
        let mut index = Self::new();
        let mut orphaned = 0usize;

        for manifest in manifests {
            let key = manifest.tag_lookup_key();
            let Some(image) = reader.resolve_repo_for_manifest_key(&key).await? else {
                tracing::debug!(pk = %manifest.pk, %key, "No tag references manifest {key}");
                orphaned += 1;
                continue;
            };

            index.add_manifest(manifest, &image);
        }

        tracing::debug!(
            digests = index.len(),
            orphaned,
            "Indexed {} digests",
            index.len()
        );
        Ok(index)
    }

    /// Attribute every blob `manifest` references to `image`.
    pub fn add_manifest(&mut self, manifest: &ManifestRecord, image: &str) {
        for digest in manifest.blob_digests() {
            self.insert(digest.clone(), image);
        }
    }

    /// Attribute one digest to `image`.
    pub fn insert(&mut self, digest: Digest, image: &str) {
        self.entries
            .entry(digest)
            .or_default()
            .insert(image.to_owned());
    }

    /// The images referencing `digest`, in sorted order.
    pub fn get(&self, digest: &Digest) -> Option<&BTreeSet<String>> {
        self.entries.get(digest)
    }

    /// Number of distinct digests in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no digests.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
