//! Error types for filesystem operations.

use bucketfs_store::StoreError;
use thiserror::Error;

/// Errors that can occur while emulating filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path is not a well-formed object-store URI.
    #[error("invalid URI {path:?}: {reason}")]
    InvalidUri { path: String, reason: String },

    /// The path uses a scheme this filesystem does not serve.
    #[error("unsupported scheme in path {0:?}")]
    UnsupportedScheme(String),

    /// Nothing exists at the path.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The path exists but is an object, not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Copying a directory was requested without recursion.
    #[error("{0} is a directory; copying it requires recursive mode")]
    RecursiveCopyRequired(String),

    /// The copy or rename destination cannot receive the source.
    #[error("cannot copy {src} to {dst}: {reason}")]
    InvalidCopyTarget {
        src: String,
        dst: String,
        reason: String,
    },

    /// A batch delete left some keys behind.
    #[error("failed to delete {} key(s) under {path}: {}", .failed.len(), .failed.join(", "))]
    DeleteFailed { path: String, failed: Vec<String> },

    /// The operation exists in the filesystem API but not in this emulation.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// `open` was called with a mode other than read.
    #[error("invalid open mode {0:?}: only read modes are supported")]
    InvalidMode(String),

    /// The operation makes no sense for this kind of path (store root, bucket).
    #[error("invalid operation on {path}: {reason}")]
    InvalidOperation { path: String, reason: String },

    /// Copies reported success but some destination keys are absent.
    #[error("rename of {src} to {dst} aborted before deleting the source: {} object(s) missing at destination", .missing.len())]
    RenameVerification {
        src: String,
        dst: String,
        missing: Vec<String>,
    },

    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error on the local side (local uploads, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error returned by the object store, passed through unmodified.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl FsError {
    pub(crate) fn invalid_operation(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_target(src: impl ToString, dst: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidCopyTarget {
            src: src.to_string(),
            dst: dst.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
