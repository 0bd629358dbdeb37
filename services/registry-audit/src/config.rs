//! Run configuration.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use storage::{StorageConfig, StorageError};

use crate::context::AuditContext;
use crate::metadata::{MemoryMetadata, MetadataError, MetadataReader, SnapshotMetadata};

/// Default directory results and logs are written to.
pub const DEFAULT_OUTPUT_DIR: &str = "/out";

/// Default name of the verbose log file, inside the output directory.
pub const DEFAULT_LOG_FILE: &str = "msr-check.log";

/// Errors preparing a run from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("reading configuration from {path}: {source}")]
    Read {
        /// Configuration file
        path: Utf8PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid
    #[error("parsing configuration from {path}: {source}")]
    Parse {
        /// Configuration file
        path: Utf8PathBuf,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },

    /// No snapshot path was given, and there is no replica id to derive one from
    #[error("a replica id is required to locate the metadata snapshot")]
    MissingReplicaId,

    /// Blob storage could not be opened
    #[error("opening blob storage: {0}")]
    Storage(#[from] StorageError),

    /// The metadata store could not be opened
    #[error("opening metadata store: {0}")]
    Metadata(#[from] MetadataError),
}

/// Where metadata records are read from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataConfig {
    /// Empty in-memory tables.
    Memory,

    /// A JSON table export of the registry database.
    Snapshot {
        /// Export directory. Defaults to `<output-dir>/dtr-rethinkdb-<replica-id>`.
        #[serde(default)]
        path: Option<Utf8PathBuf>,

        /// Database within the export.
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_database() -> String {
    crate::metadata::DEFAULT_DATABASE.to_owned()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        MetadataConfig::Snapshot {
            path: None,
            database: default_database(),
        }
    }
}

/// Configuration for an audit run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AuditConfig {
    /// Replica of the metadata database to read.
    pub replica_id: Option<String>,

    /// Directory results, logs and snapshots live in.
    pub output_dir: Utf8PathBuf,

    /// Verbose log file name, relative to the output directory.
    pub log_file: Utf8PathBuf,

    /// Blob storage.
    pub storage: StorageConfig,

    /// Metadata store.
    pub metadata: MetadataConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            replica_id: None,
            output_dir: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            log_file: Utf8PathBuf::from(DEFAULT_LOG_FILE),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml(path: &Utf8Path, document: &str) -> Result<Self, ConfigError> {
        toml::from_str(document).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Read a TOML configuration file.
    pub async fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let document = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?;
        Self::from_toml(path, &document)
    }

    /// Path of the verbose log file.
    pub fn log_path(&self) -> Utf8PathBuf {
        self.output_dir.join(&self.log_file)
    }

    /// Directory of the metadata snapshot to read, if the metadata comes from one.
    pub fn snapshot_path(&self) -> Result<Option<Utf8PathBuf>, ConfigError> {
        match &self.metadata {
            MetadataConfig::Memory => Ok(None),
            MetadataConfig::Snapshot {
                path: Some(path), ..
            } => Ok(Some(path.clone())),
            MetadataConfig::Snapshot { path: None, .. } => {
                let replica = self
                    .replica_id
                    .as_deref()
                    .ok_or(ConfigError::MissingReplicaId)?;
                Ok(Some(
                    self.output_dir.join(format!("dtr-rethinkdb-{replica}")),
                ))
            }
        }
    }

    /// Open the configured metadata store.
    pub async fn metadata_reader(&self) -> Result<MetadataReader, ConfigError> {
        let reader: MetadataReader = match (&self.metadata, self.snapshot_path()?) {
            (MetadataConfig::Snapshot { database, .. }, Some(path)) => {
                SnapshotMetadata::open(&path, database).await?.into()
            }
            _ => MemoryMetadata::default().into(),
        };
        Ok(reader)
    }

    /// Open the metadata store and blob storage for a run.
    #[tracing::instrument(skip(self), fields(replica = self.replica_id.as_deref().unwrap_or("-")))]
    pub async fn context(&self) -> Result<AuditContext, ConfigError> {
        let metadata = self.metadata_reader().await?;
        let storage = self.storage.clone().build().await?;
        Ok(AuditContext::new(metadata, storage))
    }
}
