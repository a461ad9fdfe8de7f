use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a single object, as returned by listings and HEAD requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Full key within the bucket.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Time of the last write.
    pub last_modified: DateTime<Utc>,
}

impl ObjectMeta {
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
        }
    }
}

/// A top-level bucket under the store root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub created: DateTime<Utc>,
}

/// A key that a batch delete could not remove.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Outcome of a multi-object delete.
///
/// The store may remove some keys and fail on others. An empty `failed`
/// list means every requested key is gone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    /// Returns `true` when no key failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Keys that failed, in request order.
    pub fn failed_keys(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.key.clone()).collect()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: DeleteReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// Handle for an in-progress multipart upload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

impl MultipartUpload {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: uuid::Uuid::now_v7().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_report_merge() {
        let mut report = DeleteReport {
            deleted: vec!["a".into()],
            failed: vec![],
        };
        assert!(report.is_success());

        report.merge(DeleteReport {
            deleted: vec!["b".into()],
            failed: vec![DeleteFailure {
                key: "c".into(),
                message: "AccessDenied".into(),
            }],
        });
        assert!(!report.is_success());
        assert_eq!(report.deleted, vec!["a", "b"]);
        assert_eq!(report.failed_keys(), vec!["c"]);
    }

    #[test]
    fn upload_ids_are_unique() {
        let a = MultipartUpload::new("bucket", "key");
        let b = MultipartUpload::new("bucket", "key");
        assert_ne!(a.upload_id, b.upload_id);
    }
}
