/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bucket does not exist.
    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    /// The key does not exist in the bucket.
    #[error("no such key: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// The multipart upload id is unknown (never created, completed or aborted).
    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    /// A bucket can only be deleted once it holds no objects.
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// The bucket name is not usable by this backend.
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: String },

    /// The key is not usable by this backend.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A multipart upload was completed with no parts, or with a gap.
    #[error("invalid multipart upload {upload_id}: {reason}")]
    InvalidUpload { upload_id: String, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (network, throttling, injected faults).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
