//! Uniform stat records for every kind of path.

use bucketfs_store::ObjectMeta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::{ListingEntry, NodeKind};
use crate::error::{FsError, FsResult};
use crate::fs::BucketFs;
use crate::uri::{self, ObjectPath};

/// Metadata for one filesystem path.
///
/// The store root and bucket roots are always directories of size 0 with
/// no modification time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Basename: the bucket name at a bucket root, empty at the store root.
    pub name: String,
    /// Canonical path, e.g. `s3a://`, `s3a://bucket`, `s3a://bucket/key`.
    pub path: String,
    pub is_dir: bool,
    /// Object size in bytes; 0 for directories.
    pub size: u64,
    /// Last write time of the object or directory marker.
    pub mtime: Option<DateTime<Utc>>,
}

impl StatRecord {
    fn new(path: &ObjectPath, is_dir: bool, size: u64, mtime: Option<DateTime<Utc>>) -> Self {
        let canonical = path.bucket().map_or_else(
            || path.to_string(),
            |bucket| match path.key() {
                Some(key) => format!("{}://{bucket}/{key}", path.scheme()),
                None => format!("{}://{bucket}", path.scheme()),
            },
        );
        Self {
            name: path.basename().to_string(),
            path: canonical,
            is_dir,
            size,
            mtime,
        }
    }

    pub(crate) fn for_root(path: &ObjectPath) -> Self {
        Self::new(path, true, 0, None)
    }

    pub(crate) fn for_bucket(path: &ObjectPath) -> Self {
        Self::new(path, true, 0, None)
    }

    pub(crate) fn for_file(path: &ObjectPath, meta: &ObjectMeta) -> Self {
        Self::new(path, false, meta.size, Some(meta.last_modified))
    }

    pub(crate) fn for_directory(path: &ObjectPath, marker: Option<&ObjectMeta>) -> Self {
        Self::new(path, true, 0, marker.map(|m| m.last_modified))
    }

    /// Stat a listed child without further store calls.
    pub(crate) fn for_entry(path: &ObjectPath, entry: &ListingEntry) -> Self {
        match (&entry.object, entry.is_dir()) {
            (Some(object), false) => Self::for_file(path, object),
            _ => Self::for_directory(path, entry.marker.as_ref()),
        }
    }
}

impl BucketFs {
    /// Stat `path`.
    ///
    /// Paths outside the configured scheme fail with
    /// [`FsError::UnsupportedScheme`]; anything that does not exist,
    /// including paths in a missing bucket, fails with
    /// [`FsError::NotFound`].
    pub fn stats(&self, path: &str) -> FsResult<StatRecord> {
        if !uri::is_object_uri(path, &self.config.scheme) {
            return Err(FsError::UnsupportedScheme(path.to_string()));
        }
        let parsed = self.parse(path)?;
        self.stat_path(&parsed)
    }

    pub(crate) fn stat_path(&self, path: &ObjectPath) -> FsResult<StatRecord> {
        let Some(bucket) = path.bucket() else {
            return Ok(StatRecord::for_root(path));
        };
        if path.is_bucket_root() {
            return if self.store.bucket_exists(bucket)? {
                Ok(StatRecord::for_bucket(path))
            } else {
                Err(FsError::NotFound(path.to_string()))
            };
        }
        match self.probe(path)? {
            NodeKind::Missing => Err(FsError::NotFound(path.to_string())),
            NodeKind::File(meta) => Ok(StatRecord::for_file(path, &meta)),
            NodeKind::Directory { marker, .. } => Ok(StatRecord::for_directory(path, marker.as_ref())),
        }
    }
}
