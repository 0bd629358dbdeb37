//! Records read from the registry metadata store.
//!
//! Blob content has two identities: the content [`Digest`] (what the blob is)
//! and the storage-assigned [`BlobId`] (where the blob lives on disk). They are
//! distinct types so one can't be used in place of the other.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Content digest of a blob, e.g. `sha256:4f6b...`. Logical identity.
    Digest
);

string_id!(
    /// Storage-assigned identifier of a blob. Physical identity, used to
    /// derive the blob's location on disk.
    BlobId
);

impl BlobId {
    /// The two-character shard directory this blob is stored under, if the
    /// identifier is long enough to have one.
    pub fn shard(&self) -> Option<&str> {
        let (start, second) = self.0.char_indices().nth(1)?;
        Some(&self.0[..start + second.len_utf8()])
    }
}

/// A row of the `blobs` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Content digest.
    pub sha256sum: Digest,

    /// Storage identifier.
    pub id: BlobId,

    /// Media type of the blob content.
    #[serde(rename = "mediaType", default, deserialize_with = "null_as_default")]
    pub media_type: String,
}

impl BlobRecord {
    /// Create a blob record.
    pub fn new(
        sha256sum: impl Into<Digest>,
        id: impl Into<BlobId>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            sha256sum: sha256sum.into(),
            id: id.into(),
            media_type: media_type.into(),
        }
    }
}

/// A row of the `blob_links` table, linking a blob to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLinkRecord {
    /// Organization (namespace) of the linked repository.
    #[serde(default, deserialize_with = "null_as_default")]
    pub namespace: String,

    /// Repository name, without the namespace.
    #[serde(default, deserialize_with = "null_as_default")]
    pub repository: String,

    /// Content digest of the linked blob.
    pub digest: Digest,
}

impl BlobLinkRecord {
    /// Create a blob link.
    pub fn new(
        namespace: impl Into<String>,
        repository: impl Into<String>,
        digest: impl Into<Digest>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            repository: repository.into(),
            digest: digest.into(),
        }
    }
}

/// A layer entry inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Content digest of the layer blob.
    #[serde(default, deserialize_with = "null_as_default")]
    pub digest: Digest,

    /// Declared size of the layer, in bytes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,

    /// Media type of the layer.
    #[serde(rename = "mediaType", default, deserialize_with = "null_as_default")]
    pub media_type: String,
}

impl LayerRecord {
    /// Create a layer entry.
    pub fn new(digest: impl Into<Digest>, size: u64, media_type: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            size,
            media_type: media_type.into(),
        }
    }
}

/// A row of the `manifests` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Primary key, `<repository>@<digest>`. May be stale if the manifest
    /// was copied from another repository.
    pub pk: String,

    /// Manifest digest.
    #[serde(default, deserialize_with = "null_as_default")]
    pub digest: Digest,

    /// Repository that owns this manifest.
    #[serde(default, deserialize_with = "null_as_default")]
    pub repository: String,

    /// Layers, in stored order. The store may contain `null` entries.
    #[serde(default, deserialize_with = "null_as_default")]
    pub layers: Vec<Option<LayerRecord>>,

    /// Digest of the image configuration blob.
    #[serde(rename = "configDigest", default)]
    pub config_digest: Option<Digest>,
}

impl ManifestRecord {
    /// Create a manifest record with no layers and no config.
    pub fn new(
        pk: impl Into<String>,
        digest: impl Into<Digest>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            pk: pk.into(),
            digest: digest.into(),
            repository: repository.into(),
            layers: Vec::new(),
            config_digest: None,
        }
    }

    /// Set the config digest.
    pub fn with_config(mut self, digest: impl Into<Digest>) -> Self {
        self.config_digest = Some(digest.into());
        self
    }

    /// Append a layer.
    pub fn with_layer(mut self, layer: LayerRecord) -> Self {
        self.layers.push(Some(layer));
        self
    }

    /// The config digest, if set and non-empty.
    pub fn config(&self) -> Option<&Digest> {
        self.config_digest.as_ref().filter(|digest| !digest.is_empty())
    }

    /// Layers with a non-empty digest, in stored order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerRecord> {
        self.layers
            .iter()
            .flatten()
            .filter(|layer| !layer.digest.is_empty())
    }

    /// Every blob digest this manifest references: the config first, then
    /// each layer in stored order.
    pub fn blob_digests(&self) -> impl Iterator<Item = &Digest> {
        self.config()
            .into_iter()
            .chain(self.layers().map(|layer| &layer.digest))
    }

    /// The key to look this manifest's tag up by.
    ///
    /// Manifests copied between repositories keep the primary key of their
    /// source, so when the manifest names its repository the key is rebuilt
    /// as `<repository>@<digest>` from the digest part of the stored key.
    pub fn tag_lookup_key(&self) -> String {
        if self.repository.is_empty() {
            return self.pk.clone();
        }

        let digest = self
            .pk
            .split_once('@')
            .map(|(_, digest)| digest)
            .unwrap_or(self.digest.as_str());
        format!("{}@{}", self.repository, digest)
    }
}

/// A row of the `tags` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Primary key, `<repository>:<name>`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pk: String,

    /// Repository, including the namespace (`org/repo`).
    pub repository: String,

    /// Tag name.
    pub name: String,

    /// Digest of the tagged manifest.
    #[serde(default, deserialize_with = "null_as_default")]
    pub digest: Digest,

    /// Primary key of the tagged manifest.
    #[serde(rename = "digestPK", default, deserialize_with = "null_as_default")]
    pub digest_pk: String,
}

impl TagRecord {
    /// Create a tag record for the manifest with digest `digest` in `repository`.
    pub fn new(
        repository: impl Into<String>,
        name: impl Into<String>,
        digest: impl Into<Digest>,
    ) -> Self {
        let repository = repository.into();
        let name = name.into();
        let digest = digest.into();
        Self {
            pk: format!("{repository}:{name}"),
            digest_pk: format!("{repository}@{digest}"),
            repository,
            name,
            digest,
        }
    }

    /// Override the manifest primary key this tag points at.
    pub fn with_digest_pk(mut self, digest_pk: impl Into<String>) -> Self {
        self.digest_pk = digest_pk.into();
        self
    }

    /// The primary key, derived from repository and name if the stored key is empty.
    pub fn primary_key(&self) -> String {
        if self.pk.is_empty() {
            self.image()
        } else {
            self.pk.clone()
        }
    }

    /// The human-facing `repository:tag` identifier.
    pub fn image(&self) -> String {
        format!("{}:{}", self.repository, self.name)
    }
}
