//! Read-only access to the registry metadata store.
//!
//! Backends implement [`MetadataStore`]; the rest of the crate goes through
//! the cloneable [`MetadataReader`] handle, which adds the scan-level
//! operations (filtered blob loading, tag attribution) on top.

use std::fmt;
use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::model::{BlobRecord, Digest, ManifestRecord, TagRecord};

mod memory;
mod snapshot;

pub use memory::{MemoryMetadata, MetadataTables};
pub use snapshot::{DEFAULT_DATABASE, SnapshotMetadata};

/// Errors from reading the metadata store. Every variant is fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// A table could not be read from its source.
    #[error("reading {table} table from {path}: {source}")]
    Read {
        /// Table name
        table: &'static str,
        /// Source location
        path: Utf8PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A table was read but its documents could not be decoded.
    #[error("decoding {table} table from {path}: {source}")]
    Decode {
        /// Table name
        table: &'static str,
        /// Source location
        path: Utf8PathBuf,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },
}

/// Restricts a blob scan to blobs linked to an organization and/or repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobFilter {
    /// Organization (namespace) to match.
    pub org: Option<String>,

    /// Repository name (without namespace) to match.
    pub repo: Option<String>,
}

impl BlobFilter {
    /// A filter from optional command line values. Empty strings count as unset.
    pub fn new(org: Option<String>, repo: Option<String>) -> Self {
        Self {
            org: org.filter(|org| !org.is_empty()),
            repo: repo.filter(|repo| !repo.is_empty()),
        }
    }

    /// A filter matching every blob.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one organization.
    pub fn org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    /// Restrict to one repository name.
    pub fn repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// Whether the filter restricts the scan at all.
    pub fn is_unfiltered(&self) -> bool {
        self.org.is_none() && self.repo.is_none()
    }

    /// Whether a link to `namespace`/`repository` passes this filter.
    pub fn matches(&self, namespace: &str, repository: &str) -> bool {
        self.org.as_deref().is_none_or(|org| org == namespace)
            && self.repo.as_deref().is_none_or(|repo| repo == repository)
    }
}

/// A fully specified image: organization, repository and tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Organization (namespace).
    pub org: String,

    /// Repository name, without the namespace.
    pub repo: String,

    /// Tag name.
    pub tag: String,
}

impl ImageRef {
    /// Create an image reference.
    pub fn new(org: impl Into<String>, repo: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
            tag: tag.into(),
        }
    }

    /// The full repository name, `org/repo`.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }

    /// Primary key of the tag record for this image, `org/repo:tag`.
    pub fn tag_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.org, self.repo, self.tag)
    }
}

/// A read-only metadata store backend.
///
/// Lookups return `Ok(None)` when no record matches; `Err` is reserved for
/// failures to reach or query the store.
#[async_trait::async_trait]
pub trait MetadataStore: fmt::Debug {
    /// The name of the backend.
    fn name(&self) -> &'static str;

    /// Every row of the `blobs` table.
    async fn blobs(&self) -> Result<Vec<BlobRecord>, MetadataError>;

    /// Blobs reachable through `blob_links` rows matching `filter`, each
    /// distinct (digest, id) pair once.
    async fn linked_blobs(&self, filter: &BlobFilter) -> Result<Vec<BlobRecord>, MetadataError>;

    /// Every row of the `manifests` table.
    async fn manifests(&self) -> Result<Vec<ManifestRecord>, MetadataError>;

    /// The tag whose manifest primary key is `digest_pk`.
    async fn tag_for_manifest(&self, digest_pk: &str) -> Result<Option<TagRecord>, MetadataError>;

    /// The tag record for `image`.
    async fn tag(&self, image: &ImageRef) -> Result<Option<TagRecord>, MetadataError>;

    /// A manifest with digest `digest`.
    async fn manifest(&self, digest: &Digest) -> Result<Option<ManifestRecord>, MetadataError>;

    /// A blob with content digest `digest`.
    async fn blob(&self, digest: &Digest) -> Result<Option<BlobRecord>, MetadataError>;
}

/// A cloneable handle to a metadata store backend.
#[derive(Debug, Clone)]
pub struct MetadataReader {
    store: Arc<dyn MetadataStore + Send + Sync>,
}

impl<M> From<M> for MetadataReader
where
    M: MetadataStore + Send + Sync + 'static,
{
    fn from(store: M) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

impl MetadataReader {
    /// The name of the underlying backend.
    pub fn name(&self) -> &'static str {
        self.store.name()
    }

    /// Load the blobs to scan: all of them, or only those linked to the
    /// organization/repository named by `filter`.
    #[tracing::instrument(skip(self), fields(store = self.store.name()))]
    pub async fn load_blobs(&self, filter: &BlobFilter) -> Result<Vec<BlobRecord>, MetadataError> {
        let blobs = if filter.is_unfiltered() {
            self.store.blobs().await?
        } else {
            self.store.linked_blobs(filter).await?
        };
        tracing::debug!("Loaded {} blob records", blobs.len());
        Ok(blobs)
    }

    /// Load every manifest.
    #[tracing::instrument(skip(self), fields(store = self.store.name()))]
    pub async fn load_manifests(&self) -> Result<Vec<ManifestRecord>, MetadataError> {
        let manifests = self.store.manifests().await?;
        tracing::debug!("Loaded {} manifest records", manifests.len());
        Ok(manifests)
    }

    /// Resolve a manifest primary key to the `repository:tag` that points at it.
    ///
    /// Returns `Ok(None)` for orphaned manifests which no tag references.
    pub async fn resolve_repo_for_manifest_key(
        &self,
        digest_pk: &str,
    ) -> Result<Option<String>, MetadataError> {
        let tag = self.store.tag_for_manifest(digest_pk).await?;
        Ok(tag.map(|tag| tag.image()))
    }

    /// Look up the tag record for an image.
    pub async fn tag(&self, image: &ImageRef) -> Result<Option<TagRecord>, MetadataError> {
        self.store.tag(image).await
    }

    /// Look up a manifest by digest.
    pub async fn manifest(&self, digest: &Digest) -> Result<Option<ManifestRecord>, MetadataError> {
        self.store.manifest(digest).await
    }

    /// Look up a blob by content digest.
    pub async fn blob(&self, digest: &Digest) -> Result<Option<BlobRecord>, MetadataError> {
        self.store.blob(digest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlobLinkRecord;

    static_assertions::assert_obj_safe!(MetadataStore);

    fn reader() -> MetadataReader {
        MemoryMetadata::new(MetadataTables {
            blobs: vec![
                BlobRecord::new("sha256:a", "aa01", "layer"),
                BlobRecord::new("sha256:b", "bb01", "layer"),
            ],
            blob_links: vec![BlobLinkRecord::new("org", "app", "sha256:b")],
            ..Default::default()
        })
        .into()
    }

    #[test]
    fn filter_matching() {
        assert!(BlobFilter::all().is_unfiltered());
        assert!(BlobFilter::all().matches("any", "thing"));

        let filter = BlobFilter::all().org("org");
        assert!(!filter.is_unfiltered());
        assert!(filter.matches("org", "app"));
        assert!(filter.matches("org", "other"));
        assert!(!filter.matches("else", "app"));

        let filter = BlobFilter::all().org("org").repo("app");
        assert!(filter.matches("org", "app"));
        assert!(!filter.matches("org", "other"));

        let filter = BlobFilter::all().repo("app");
        assert!(filter.matches("else", "app"));
    }

    #[test]
    fn empty_flags_are_unset() {
        let filter = BlobFilter::new(Some(String::new()), Some(String::new()));
        assert!(filter.is_unfiltered());

        let filter = BlobFilter::new(Some(String::new()), Some("app".into()));
        assert_eq!(filter, BlobFilter::all().repo("app"));
        assert!(filter.matches("org", "app"));

        let filter = BlobFilter::new(Some("org".into()), None);
        assert_eq!(filter, BlobFilter::all().org("org"));
    }

    #[tokio::test]
    async fn empty_org_loads_every_blob() {
        let blobs = reader()
            .load_blobs(&BlobFilter::new(Some(String::new()), None))
            .await
            .unwrap();
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn image_ref_keys() {
        let image = ImageRef::new("org", "app", "latest");
        assert_eq!(image.repository(), "org/app");
        assert_eq!(image.tag_key(), "org/app:latest");
    }

    #[tokio::test]
    async fn load_blobs_unfiltered_reads_everything() {
        let blobs = reader().load_blobs(&BlobFilter::all()).await.unwrap();
        assert_eq!(blobs.len(), 2);
    }

    #[tokio::test]
    async fn load_blobs_filtered_uses_links() {
        let blobs = reader()
            .load_blobs(&BlobFilter::all().org("org"))
            .await
            .unwrap();
        assert_eq!(blobs, vec![BlobRecord::new("sha256:b", "bb01", "layer")]);

        let blobs = reader()
            .load_blobs(&BlobFilter::all().org("nobody"))
            .await
            .unwrap();
        assert!(blobs.is_empty());
    }
}
