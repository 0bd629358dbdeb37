use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use storage_driver::{Driver, Metadata, StorageError, StorageErrorKind};

/// Storage driver which reads files from a directory on the local filesystem.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at `root`, without checking that it exists.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Create a driver rooted at `root`, which must be an existing directory.
    pub async fn open(root: Utf8PathBuf) -> Result<Self, StorageError> {
        let metadata = tokio::fs::metadata(&root).await.map_err(|err| {
            StorageError::io("local", err)
                .path(root.as_str())
                .context("storage root")
                .build()
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::builder(
                "local",
                StorageErrorKind::InvalidRequest,
                format!("storage root {root} is not a directory"),
            )
            .path(root.as_str())
            .build());
        }

        Ok(Self::new(root))
    }

    /// The directory this driver reads from.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path(&self, remote: &Utf8Path) -> Result<Utf8PathBuf, StorageError> {
        if !remote
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)))
        {
            return Err(StorageError::builder(
                self.name(),
                StorageErrorKind::InvalidRequest,
                format!("path {remote} escapes the storage root"),
            )
            .path(remote.as_str())
            .build());
        }

        Ok(self.root.join(remote))
    }
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let path = self.path(remote)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|err| {
            StorageError::io(self.name(), err)
                .path(path.as_str())
                .context("metadata")
                .build()
        })?;

        if !metadata.is_file() {
            return Err(StorageError::builder(
                self.name(),
                StorageErrorKind::InvalidRequest,
                format!("{path} is not a regular file"),
            )
            .path(path.as_str())
            .build());
        }

        let modified = metadata.modified().map_err(|err| {
            StorageError::io(self.name(), err)
                .path(path.as_str())
                .context("modified timestamp")
                .build()
        })?;

        Ok(Metadata {
            size: metadata.len(),
            modified: modified.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        (dir, root)
    }

    #[tokio::test]
    async fn metadata_reports_size() {
        let (_dir, root) = tempdir();
        std::fs::create_dir_all(root.join("ab/ab12")).unwrap();
        std::fs::write(root.join("ab/ab12/data"), b"layer").unwrap();

        let driver = LocalDriver::open(root).await.unwrap();
        let metadata = driver.metadata(Utf8Path::new("ab/ab12/data")).await.unwrap();
        assert_eq!(metadata.size, 5);
        assert!(!metadata.is_empty());
    }

    #[tokio::test]
    async fn metadata_missing_file() {
        let (_dir, root) = tempdir();
        let driver = LocalDriver::new(root);

        let error = driver
            .metadata(Utf8Path::new("ab/ab12/data"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), StorageErrorKind::NotFound);
        assert!(error.path().unwrap().ends_with("ab/ab12/data"));
    }

    #[tokio::test]
    async fn metadata_directory_is_not_a_file() {
        let (_dir, root) = tempdir();
        std::fs::create_dir_all(root.join("ab/ab12/data")).unwrap();
        let driver = LocalDriver::new(root);

        let error = driver
            .metadata(Utf8Path::new("ab/ab12/data"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), StorageErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let (_dir, root) = tempdir();
        let driver = LocalDriver::new(root);

        for remote in ["../etc/passwd", "/etc/passwd", "./ab/ab12/data"] {
            let error = driver.metadata(Utf8Path::new(remote)).await.unwrap_err();
            assert_eq!(error.kind(), StorageErrorKind::InvalidRequest, "{remote}");
        }
    }

    #[tokio::test]
    async fn open_requires_directory() {
        let (_dir, root) = tempdir();
        let file = root.join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let error = LocalDriver::open(file).await.unwrap_err();
        assert_eq!(error.kind(), StorageErrorKind::InvalidRequest);

        let error = LocalDriver::open(root.join("absent")).await.unwrap_err();
        assert_eq!(error.kind(), StorageErrorKind::NotFound);
    }
}
