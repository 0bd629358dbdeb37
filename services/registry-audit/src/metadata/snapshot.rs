use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;

use super::{BlobFilter, ImageRef, MemoryMetadata, MetadataError, MetadataStore, MetadataTables};
use crate::model::{BlobRecord, Digest, ManifestRecord, TagRecord};

/// Database holding the registry tables.
pub const DEFAULT_DATABASE: &str = "dtr2";

/// Metadata store read from a JSON table export of the registry database.
///
/// The export directory holds one directory per database, and one
/// `<table>.json` file per table containing a JSON array of documents:
///
/// ```text
/// <path>/dtr2/blobs.json
/// <path>/dtr2/blob_links.json
/// <path>/dtr2/manifests.json
/// <path>/dtr2/tags.json
/// ```
///
/// The tables are read once, when the snapshot is opened.
#[derive(Debug)]
pub struct SnapshotMetadata {
    path: Utf8PathBuf,
    inner: MemoryMetadata,
}

impl SnapshotMetadata {
    /// Read every table of `database` under the export directory `path`.
    #[tracing::instrument]
    pub async fn open(path: &Utf8Path, database: &str) -> Result<Self, MetadataError> {
        let dir = path.join(database);
        let tables = MetadataTables {
            blobs: read_table(&dir, "blobs").await?,
            blob_links: read_table(&dir, "blob_links").await?,
            manifests: read_table(&dir, "manifests").await?,
            tags: read_table(&dir, "tags").await?,
        };

        tracing::info!(
            blobs = tables.blobs.len(),
            blob_links = tables.blob_links.len(),
            manifests = tables.manifests.len(),
            tags = tables.tags.len(),
            "Opened metadata snapshot at {dir}"
        );

        Ok(Self {
            path: dir,
            inner: MemoryMetadata::new(tables),
        })
    }

    /// Directory the tables were read from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

async fn read_table<T>(dir: &Utf8Path, table: &'static str) -> Result<Vec<T>, MetadataError>
where
    T: DeserializeOwned,
{
    let path = dir.join(format!("{table}.json"));
    tracing::debug!("Reading {table} table from {path}");

    let data = tokio::fs::read(&path)
        .await
        .map_err(|source| MetadataError::Read {
            table,
            path: path.clone(),
            source,
        })?;

    serde_json::from_slice(&data).map_err(|source| MetadataError::Decode {
        table,
        path,
        source,
    })
}

#[async_trait::async_trait]
impl MetadataStore for SnapshotMetadata {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn blobs(&self) -> Result<Vec<BlobRecord>, MetadataError> {
        self.inner.blobs().await
    }

    async fn linked_blobs(&self, filter: &BlobFilter) -> Result<Vec<BlobRecord>, MetadataError> {
        self.inner.linked_blobs(filter).await
    }

    async fn manifests(&self) -> Result<Vec<ManifestRecord>, MetadataError> {
        self.inner.manifests().await
    }

    async fn tag_for_manifest(&self, digest_pk: &str) -> Result<Option<TagRecord>, MetadataError> {
        self.inner.tag_for_manifest(digest_pk).await
    }

    async fn tag(&self, image: &ImageRef) -> Result<Option<TagRecord>, MetadataError> {
        self.inner.tag(image).await
    }

    async fn manifest(&self, digest: &Digest) -> Result<Option<ManifestRecord>, MetadataError> {
        self.inner.manifest(digest).await
    }

    async fn blob(&self, digest: &Digest) -> Result<Option<BlobRecord>, MetadataError> {
        self.inner.blob(digest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tables(root: &Utf8Path, tags: &str) {
        let dir = root.join(DEFAULT_DATABASE);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("blobs.json"),
            r#"[{"sha256sum": "sha256:l1", "id": "ab12", "mediaType": "layer", "size": 10}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("blob_links.json"),
            r#"[{"id": "x", "namespace": "org", "repository": "app", "digest": "sha256:l1"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("manifests.json"),
            r#"[{"pk": "org/app@sha256:m", "digest": "sha256:m", "repository": "org/app",
                 "layers": [{"digest": "sha256:l1", "size": 10, "mediaType": "layer"}]}]"#,
        )
        .unwrap();
        std::fs::write(dir.join("tags.json"), tags).unwrap();
    }

    #[tokio::test]
    async fn open_reads_export_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_tables(
            root,
            r#"[{"pk": "org/app:latest", "repository": "org/app", "name": "latest",
                 "digest": "sha256:m", "digestPK": "org/app@sha256:m"}]"#,
        );

        let snapshot = SnapshotMetadata::open(root, DEFAULT_DATABASE).await.unwrap();
        assert_eq!(snapshot.path(), root.join("dtr2").as_path());
        assert_eq!(snapshot.blobs().await.unwrap().len(), 1);
        assert_eq!(
            snapshot
                .linked_blobs(&BlobFilter::all().repo("app"))
                .await
                .unwrap()
                .len(),
            1
        );
        let tag = snapshot
            .tag_for_manifest("org/app@sha256:m")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tag.image(), "org/app:latest");
    }

    #[tokio::test]
    async fn missing_table_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let error = SnapshotMetadata::open(root, DEFAULT_DATABASE)
            .await
            .unwrap_err();
        assert!(matches!(error, MetadataError::Read { table: "blobs", .. }));
    }

    #[tokio::test]
    async fn malformed_table_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_tables(root, r#"{"not": "an array"}"#);

        let error = SnapshotMetadata::open(root, DEFAULT_DATABASE)
            .await
            .unwrap_err();
        assert!(matches!(error, MetadataError::Decode { table: "tags", .. }));
    }
    #[tokio::test]
    async fn null_fields_do_not_abort_open() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let tables = root.join(DEFAULT_DATABASE);
        std::fs::create_dir_all(&tables).unwrap();
        std::fs::write(
            tables.join("blobs.json"),
            r#"[{"sha256sum": "sha256:l1", "id": "ab12", "mediaType": null}]"#,
        )
        .unwrap();
        std::fs::write(
            tables.join("blob_links.json"),
            r#"[{"namespace": "org", "repository": null, "digest": "sha256:l1"}]"#,
        )
        .unwrap();
        std::fs::write(
            tables.join("manifests.json"),
            r#"[{"pk": "org/list@sha256:m", "digest": "sha256:m", "repository": null,
                 "configDigest": null, "layers": null}]"#,
        )
        .unwrap();
        std::fs::write(
            tables.join("tags.json"),
            r#"[{"pk": "org/list:latest", "repository": "org/list", "name": "latest",
                 "digest": "sha256:m", "digestPK": null}]"#,
        )
        .unwrap();

        let snapshot = SnapshotMetadata::open(root, DEFAULT_DATABASE).await.unwrap();

        let blobs = snapshot.blobs().await.unwrap();
        assert_eq!(blobs[0].media_type, "");

        let manifest = snapshot
            .manifest(&Digest::from("sha256:m"))
            .await
            .unwrap()
            .unwrap();
        assert!(manifest.repository.is_empty());
        assert_eq!(manifest.blob_digests().count(), 0);

        assert_eq!(
            snapshot
                .linked_blobs(&BlobFilter::all().org("org"))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
