//! Destination for rendered results.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{AuditError, AuditResult};

/// Where a rendered report is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Standard output.
    Stdout,

    /// A file, replaced if it exists.
    File(Utf8PathBuf),
}

impl OutputTarget {
    /// Write to `name` inside `output_dir`, or to standard output if no name is given.
    pub fn resolve(output_dir: &Utf8Path, name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => OutputTarget::File(output_dir.join(name)),
            _ => OutputTarget::Stdout,
        }
    }

    /// Write `contents` to the target.
    #[tracing::instrument(skip(contents), fields(bytes = contents.len()))]
    pub async fn write(&self, contents: &str) -> AuditResult<()> {
        let result = match self {
            OutputTarget::Stdout => {
                let mut stdout = tokio::io::stdout();
                match stdout.write_all(contents.as_bytes()).await {
                    Ok(()) => stdout.flush().await,
                    Err(error) => Err(error),
                }
            }
            OutputTarget::File(path) => tokio::fs::write(path, contents).await,
        };

        result.map_err(|source| AuditError::Output {
            target: self.to_string(),
            source,
        })
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("<stdout>"),
            OutputTarget::File(path) => write!(f, "{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_targets() {
        let dir = Utf8Path::new("/out");
        assert_eq!(OutputTarget::resolve(dir, None), OutputTarget::Stdout);
        assert_eq!(OutputTarget::resolve(dir, Some("")), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::resolve(dir, Some("missing.txt")),
            OutputTarget::File("/out/missing.txt".into())
        );
    }

    #[tokio::test]
    async fn write_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let target = OutputTarget::resolve(root, Some("report.txt"));

        target.write("repoA:latest\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("report.txt")).unwrap(),
            "repoA:latest\n"
        );
    }

    #[tokio::test]
    async fn write_failure_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let target = OutputTarget::resolve(&root.join("absent"), Some("report.txt"));

        let error = target.write("x").await.unwrap_err();
        assert!(matches!(error, AuditError::Output { .. }));
    }
}
