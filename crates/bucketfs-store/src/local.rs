//! Directory-backed object store.
//!
//! [`LocalObjectStore`] keeps a flat namespace on disk: each bucket is a
//! directory under the root and each object is a single file whose name is
//! the hex encoding of its key. Keys therefore never map onto nested
//! directories, so `a` and `a/b` can coexist exactly as they can in a real
//! object store.
//!
//! ```text
//! <root>/
//!   <bucket>/
//!     <hex(key)>          object content
//!   .uploads/
//!     <upload_id>/
//!       <part_number>     pending multipart parts
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{BucketInfo, MultipartUpload, ObjectMeta};
use crate::traits::ObjectStore;

const UPLOADS_DIR: &str = ".uploads";
const TEMP_PREFIX: &str = ".tmp";

/// Object store persisted in a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(UPLOADS_DIR))?;
        debug!(root = %root.display(), "local object store opened");
        Ok(Self { root })
    }

    /// Directory holding the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
        validate_bucket_name(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn existing_bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key must not be empty".into(),
            });
        }
        Ok(self.existing_bucket_dir(bucket)?.join(hex::encode(key)))
    }

    fn upload_dir(&self, upload: &MultipartUpload) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(&upload.upload_id)
    }

    /// Write `data` to `path` through a temp file in the same directory.
    fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> StoreResult<()> {
        let mut tmp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn meta_for(key: String, path: &Path) -> StoreResult<ObjectMeta> {
        let md = fs::metadata(path)?;
        let modified: DateTime<Utc> = md.modified()?.into();
        Ok(ObjectMeta::new(key, md.len(), modified))
    }
}

/// Bucket names must be usable as a single directory name and must not
/// collide with the store's own bookkeeping directories.
fn validate_bucket_name(bucket: &str) -> StoreResult<()> {
    let reason = if bucket.is_empty() {
        Some("bucket name must not be empty")
    } else if bucket.starts_with('.') {
        Some("bucket name must not start with '.'")
    } else if bucket.contains(['/', '\\']) {
        Some("bucket name must not contain path separators")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidBucketName {
            name: bucket.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

fn ignore_not_found(result: io::Result<()>) -> StoreResult<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other.map_err(StoreError::from),
    }
}

impl ObjectStore for LocalObjectStore {
    fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            let md = entry.metadata()?;
            let created = md.created().or_else(|_| md.modified())?;
            buckets.push(BucketInfo {
                name,
                created: created.into(),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        if validate_bucket_name(bucket).is_err() {
            return Ok(false);
        }
        Ok(self.root.join(bucket).is_dir())
    }

    fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        fs::create_dir_all(self.bucket_dir(bucket)?)?;
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        let dir = self.existing_bucket_dir(bucket)?;
        if !self.list(bucket, "")?.is_empty() {
            return Err(StoreError::BucketNotEmpty(bucket.to_string()));
        }
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        let dir = self.existing_bucket_dir(bucket)?;
        let mut objects = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            // Temp files and anything else not hex-named are not objects.
            let Some(key) = hex::decode(name.to_string_lossy().as_bytes())
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
            else {
                continue;
            };
            if key.starts_with(prefix) {
                objects.push(Self::meta_for(key, &entry.path())?);
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Ok(None);
        }
        Self::meta_for(key.to_string(), &path).map(Some)
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        let dir = self.existing_bucket_dir(bucket)?;
        Self::write_atomic(&dir, &path, data)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        ignore_not_found(fs::remove_file(path))
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()> {
        let data = self
            .get_object(src_bucket, src_key)?
            .ok_or_else(|| StoreError::NoSuchKey {
                bucket: src_bucket.to_string(),
                key: src_key.to_string(),
            })?;
        self.put_object(dst_bucket, dst_key, &data)
    }

    fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<MultipartUpload> {
        self.object_path(bucket, key)?;
        let upload = MultipartUpload::new(bucket, key);
        fs::create_dir_all(self.upload_dir(&upload))?;
        Ok(upload)
    }

    fn upload_part(&self, upload: &MultipartUpload, part_number: u32, data: &[u8]) -> StoreResult<()> {
        let dir = self.upload_dir(upload);
        if !dir.is_dir() {
            return Err(StoreError::NoSuchUpload(upload.upload_id.clone()));
        }
        let path = dir.join(format!("{part_number:010}"));
        Self::write_atomic(&dir, &path, data)
    }

    fn complete_multipart_upload(&self, upload: &MultipartUpload) -> StoreResult<()> {
        let dir = self.upload_dir(upload);
        if !dir.is_dir() {
            return Err(StoreError::NoSuchUpload(upload.upload_id.clone()));
        }
        let mut parts: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Ok(number) = entry.file_name().to_string_lossy().parse::<u32>() {
                parts.push((number, entry.path()));
            }
        }
        parts.sort_by_key(|(number, _)| *number);
        if parts.is_empty() {
            return Err(StoreError::InvalidUpload {
                upload_id: upload.upload_id.clone(),
                reason: "no parts uploaded".into(),
            });
        }
        let mut data = Vec::new();
        for (expected, (number, path)) in (1u32..).zip(&parts) {
            if *number != expected {
                return Err(StoreError::InvalidUpload {
                    upload_id: upload.upload_id.clone(),
                    reason: format!("missing part {expected}"),
                });
            }
            data.extend(fs::read(path)?);
        }
        self.put_object(&upload.bucket, &upload.key, &data)?;
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    fn abort_multipart_upload(&self, upload: &MultipartUpload) -> StoreResult<()> {
        let dir = self.upload_dir(upload);
        if !dir.is_dir() {
            return Err(StoreError::NoSuchUpload(upload.upload_id.clone()));
        }
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();
        store.create_bucket("gethue").unwrap();
        (dir, store)
    }

    #[test]
    fn file_and_prefix_keys_coexist() {
        let (_dir, store) = open();
        store.put_object("gethue", "a", b"file").unwrap();
        store.put_object("gethue", "a/", b"").unwrap();
        store.put_object("gethue", "a/b", b"child").unwrap();

        let keys: Vec<String> = store
            .list("gethue", "a")
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["a", "a/", "a/b"]);
        assert_eq!(store.get_object("gethue", "a/b").unwrap().unwrap(), b"child");

        let first: Vec<String> = store
            .list_page("gethue", "a/", 1)
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(first, vec!["a/"]);
    }

    #[test]
    fn buckets_exclude_bookkeeping() {
        let (_dir, store) = open();
        store.create_bucket("other").unwrap();
        let names: Vec<String> = store
            .list_buckets()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["gethue", "other"]);
        assert!(store.create_bucket(".uploads").is_err());
        assert!(!store.bucket_exists(".uploads").unwrap());
    }

    #[test]
    fn missing_objects_and_buckets() {
        let (_dir, store) = open();
        assert!(store.head_object("gethue", "nope").unwrap().is_none());
        assert!(store.get_object("gethue", "nope").unwrap().is_none());
        store.delete_object("gethue", "nope").unwrap();
        assert!(matches!(store.list("missing", ""), Err(StoreError::NoSuchBucket(_))));
    }

    #[test]
    fn copy_and_batch_delete() {
        let (_dir, store) = open();
        store.put_object("gethue", "src", b"payload").unwrap();
        store.copy_object("gethue", "src", "gethue", "dst").unwrap();
        assert_eq!(store.get_object("gethue", "dst").unwrap().unwrap(), b"payload");

        let report = store
            .delete_objects("gethue", &["src".to_string(), "dst".to_string()])
            .unwrap();
        assert!(report.is_success());
        assert!(store.list("gethue", "").unwrap().is_empty());
        store.delete_bucket("gethue").unwrap();
        assert!(!store.bucket_exists("gethue").unwrap());
    }

    #[test]
    fn multipart_roundtrip() {
        let (_dir, store) = open();
        let upload = store.create_multipart_upload("gethue", "big").unwrap();
        store.upload_part(&upload, 1, b"abc").unwrap();
        store.upload_part(&upload, 2, b"def").unwrap();
        store.complete_multipart_upload(&upload).unwrap();
        assert_eq!(store.get_object("gethue", "big").unwrap().unwrap(), b"abcdef");
        assert!(store.abort_multipart_upload(&upload).is_err());
    }

    #[test]
    fn ranged_read_uses_default_slice() {
        let (_dir, store) = open();
        store.put_object("gethue", "f", b"Hello").unwrap();
        assert_eq!(store.get_range("gethue", "f", 1, 3).unwrap().unwrap(), b"ell");
    }
}
