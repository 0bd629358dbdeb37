use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::{BlobFilter, ImageRef, MetadataError, MetadataStore};
use crate::model::{BlobId, BlobLinkRecord, BlobRecord, Digest, ManifestRecord, TagRecord};

/// The four metadata tables, as plain rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataTables {
    /// Rows of the `blobs` table.
    #[serde(default)]
    pub blobs: Vec<BlobRecord>,

    /// Rows of the `blob_links` table.
    #[serde(default)]
    pub blob_links: Vec<BlobLinkRecord>,

    /// Rows of the `manifests` table.
    #[serde(default)]
    pub manifests: Vec<ManifestRecord>,

    /// Rows of the `tags` table.
    #[serde(default)]
    pub tags: Vec<TagRecord>,
}

/// Metadata store backed by in-memory tables.
///
/// Secondary indexes mirror the ones the registry database keeps: blobs by
/// content digest, manifests by digest, tags by manifest primary key and by
/// their own primary key. Where several rows share a key the first one wins.
#[derive(Debug, Default)]
pub struct MemoryMetadata {
    tables: MetadataTables,
    blobs_by_digest: HashMap<Digest, Vec<usize>>,
    manifests_by_digest: HashMap<Digest, usize>,
    tags_by_digest_pk: HashMap<String, usize>,
    tags_by_pk: HashMap<String, usize>,
}

impl MemoryMetadata {
    /// Index the given tables.
    pub fn new(tables: MetadataTables) -> Self {
        let mut blobs_by_digest: HashMap<Digest, Vec<usize>> = HashMap::new();
        for (idx, blob) in tables.blobs.iter().enumerate() {
            blobs_by_digest
                .entry(blob.sha256sum.clone())
                .or_default()
                .push(idx);
        }

        let mut manifests_by_digest = HashMap::new();
        for (idx, manifest) in tables.manifests.iter().enumerate() {
            manifests_by_digest
                .entry(manifest.digest.clone())
                .or_insert(idx);
        }

        let mut tags_by_digest_pk = HashMap::new();
        let mut tags_by_pk = HashMap::new();
        for (idx, tag) in tables.tags.iter().enumerate() {
            tags_by_digest_pk.entry(tag.digest_pk.clone()).or_insert(idx);
            tags_by_pk.entry(tag.primary_key()).or_insert(idx);
        }

        Self {
            tables,
            blobs_by_digest,
            manifests_by_digest,
            tags_by_digest_pk,
            tags_by_pk,
        }
    }

    /// The indexed tables.
    pub fn tables(&self) -> &MetadataTables {
        &self.tables
    }
}

impl From<MetadataTables> for MemoryMetadata {
    fn from(tables: MetadataTables) -> Self {
        MemoryMetadata::new(tables)
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryMetadata {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn blobs(&self) -> Result<Vec<BlobRecord>, MetadataError> {
        Ok(self.tables.blobs.clone())
    }

    async fn linked_blobs(&self, filter: &BlobFilter) -> Result<Vec<BlobRecord>, MetadataError> {
        let mut seen: HashSet<(&Digest, &BlobId)> = HashSet::new();
        let mut blobs = Vec::new();

        let links = self
            .tables
            .blob_links
            .iter()
            .filter(|link| filter.matches(&link.namespace, &link.repository));

        for link in links {
            let Some(indexes) = self.blobs_by_digest.get(&link.digest) else {
                continue;
            };
            for blob in indexes.iter().map(|&idx| &self.tables.blobs[idx]) {
                if seen.insert((&blob.sha256sum, &blob.id)) {
                    blobs.push(blob.clone());
                }
            }
        }

        Ok(blobs)
    }

    async fn manifests(&self) -> Result<Vec<ManifestRecord>, MetadataError> {
        Ok(self.tables.manifests.clone())
    }

    async fn tag_for_manifest(&self, digest_pk: &str) -> Result<Option<TagRecord>, MetadataError> {
        Ok(self
            .tags_by_digest_pk
            .get(digest_pk)
            .map(|&idx| self.tables.tags[idx].clone()))
    }

    async fn tag(&self, image: &ImageRef) -> Result<Option<TagRecord>, MetadataError> {
        Ok(self
            .tags_by_pk
            .get(&image.tag_key())
            .map(|&idx| self.tables.tags[idx].clone()))
    }

    async fn manifest(&self, digest: &Digest) -> Result<Option<ManifestRecord>, MetadataError> {
        Ok(self
            .manifests_by_digest
            .get(digest)
            .map(|&idx| self.tables.manifests[idx].clone()))
    }

    async fn blob(&self, digest: &Digest) -> Result<Option<BlobRecord>, MetadataError> {
        Ok(self
            .blobs_by_digest
            .get(digest)
            .and_then(|indexes| indexes.first())
            .map(|&idx| self.tables.blobs[idx].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryMetadata {
        MemoryMetadata::new(MetadataTables {
            blobs: vec![
                BlobRecord::new("sha256:a", "aa01", "layer"),
                BlobRecord::new("sha256:b", "bb01", "layer"),
                BlobRecord::new("sha256:b", "bb02", "layer"),
                BlobRecord::new("sha256:c", "cc01", "config"),
            ],
            blob_links: vec![
                BlobLinkRecord::new("org", "app", "sha256:b"),
                BlobLinkRecord::new("org", "api", "sha256:b"),
                BlobLinkRecord::new("org", "api", "sha256:c"),
                BlobLinkRecord::new("other", "app", "sha256:a"),
                BlobLinkRecord::new("org", "app", "sha256:gone"),
            ],
            manifests: vec![ManifestRecord::new("org/app@sha256:m", "sha256:m", "org/app")],
            tags: vec![
                TagRecord::new("org/app", "latest", "sha256:m"),
                TagRecord::new("org/app", "stable", "sha256:m"),
            ],
        })
    }

    #[tokio::test]
    async fn linked_blobs_dedup_by_digest_and_id() {
        let blobs = store()
            .linked_blobs(&BlobFilter::all().org("org"))
            .await
            .unwrap();
        let ids: Vec<_> = blobs.iter().map(|blob| blob.id.as_str()).collect();
        assert_eq!(ids, ["bb01", "bb02", "cc01"]);
    }

    #[tokio::test]
    async fn linked_blobs_by_repository_across_orgs() {
        let blobs = store()
            .linked_blobs(&BlobFilter::all().repo("app"))
            .await
            .unwrap();
        let ids: Vec<_> = blobs.iter().map(|blob| blob.id.as_str()).collect();
        assert_eq!(ids, ["bb01", "bb02", "aa01"]);
    }

    #[tokio::test]
    async fn tag_for_manifest_first_match() {
        let tag = store()
            .tag_for_manifest("org/app@sha256:m")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tag.name, "latest");

        assert!(store()
            .tag_for_manifest("org/app@sha256:unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn point_lookups() {
        let store = store();
        let image = ImageRef::new("org", "app", "stable");
        assert_eq!(store.tag(&image).await.unwrap().unwrap().name, "stable");
        assert!(store
            .tag(&ImageRef::new("org", "app", "nightly"))
            .await
            .unwrap()
            .is_none());

        assert!(store.manifest(&"sha256:m".into()).await.unwrap().is_some());
        assert!(store.manifest(&"sha256:x".into()).await.unwrap().is_none());

        let blob = store.blob(&"sha256:b".into()).await.unwrap().unwrap();
        assert_eq!(blob.id.as_str(), "bb01");
        assert!(store.blob(&"sha256:x".into()).await.unwrap().is_none());
    }
}
