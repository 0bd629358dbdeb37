use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use tracing_error::SpanTrace;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What went wrong with a storage read, independent of the driver.
///
/// The probe decides between "absent" and "unreadable" from the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    /// Nothing exists at the path.
    NotFound,

    /// The path exists but may not be read.
    PermissionDenied,

    /// Reading failed for some other I/O reason.
    Io,

    /// The path can't be served: it escapes the root, or names a directory.
    InvalidRequest,

    /// Anything else.
    Other,
}

impl StorageErrorKind {
    /// Classify an I/O error.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput => StorageErrorKind::InvalidRequest,
            _ => StorageErrorKind::Io,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::PermissionDenied => "permission denied",
            StorageErrorKind::Io => "I/O error",
            StorageErrorKind::InvalidRequest => "invalid request",
            StorageErrorKind::Other => "other error",
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the error was raised. Backtraces follow `RUST_BACKTRACE`; span
/// traces need a `tracing_error::ErrorLayer` in the subscriber.
#[derive(Debug)]
struct Origin {
    backtrace: Backtrace,
    span_trace: SpanTrace,
}

/// A failed storage read.
///
/// Carries the [`StorageErrorKind`], the driver (engine) that failed, the
/// path and a short note on what was being attempted when known, and the
/// underlying cause.
///
/// ```rust
/// use storage_driver::{StorageError, StorageErrorKind};
///
/// let error = StorageError::builder("local", StorageErrorKind::NotFound,
///     std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))
///     .path("ab/ab12/data")
///     .context("probe")
///     .build();
/// assert_eq!(error.path(), Some("ab/ab12/data"));
/// assert!(error.is_not_found());
/// ```
#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    engine: &'static str,
    path: Option<String>,
    context: Option<String>,
    source: BoxError,
    origin: Box<Origin>,
}

impl StorageError {
    /// Start an error for `engine`, taking the kind from `error`.
    pub fn io(engine: &'static str, error: io::Error) -> StorageErrorBuilder {
        Self::builder(engine, StorageErrorKind::from_io(&error), error)
    }

    /// Start an error for `engine` of the given kind.
    pub fn builder<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> StorageErrorBuilder
    where
        E: Into<BoxError>,
    {
        StorageErrorBuilder {
            kind,
            engine,
            source: error.into(),
            path: None,
            context: None,
        }
    }

    /// The error kind.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Name of the driver which failed.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Path being read.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// What was being attempted.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Whether nothing exists at the path.
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }

    /// Backtrace captured when the error was built.
    pub fn backtrace(&self) -> &Backtrace {
        &self.origin.backtrace
    }

    /// Span trace captured when the error was built.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.origin.span_trace
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storage error [{}] from {}", self.kind, self.engine)?;
        if let Some(path) = &self.path {
            write!(f, " (path: {path})")?;
        }
        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }
        write!(f, ": {}", self.source)
    }
}

/// Adds the optional path and context to a [`StorageError`].
#[derive(Debug)]
pub struct StorageErrorBuilder {
    kind: StorageErrorKind,
    engine: &'static str,
    source: BoxError,
    path: Option<String>,
    context: Option<String>,
}

impl StorageErrorBuilder {
    /// Record the path being read.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Record what was being attempted.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Finish the error, capturing where it was raised.
    #[track_caller]
    pub fn build(self) -> StorageError {
        StorageError {
            kind: self.kind,
            engine: self.engine,
            path: self.path,
            context: self.context,
            source: self.source,
            origin: Box::new(Origin {
                backtrace: Backtrace::capture(),
                span_trace: SpanTrace::capture(),
            }),
        }
    }
}
