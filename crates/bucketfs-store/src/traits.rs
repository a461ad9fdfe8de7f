use crate::error::{StoreError, StoreResult};
use crate::object::{BucketInfo, DeleteFailure, DeleteReport, MultipartUpload, ObjectMeta};

/// Flat bucket/key object store.
///
/// This is the only capability the filesystem layer depends on. The store
/// has no notion of directories: keys are opaque strings and `/` carries no
/// meaning here.
///
/// All implementations must satisfy these invariants:
/// - `list` returns every key starting with `prefix`, in ascending key order.
/// - Writes replace any existing object at the same key.
/// - Operations on a missing bucket fail with [`StoreError::NoSuchBucket`],
///   except `bucket_exists`.
/// - All I/O errors are propagated, never silently ignored. Retrying is left
///   to the implementation or its caller.
pub trait ObjectStore: Send + Sync {
    /// List every bucket under the store root.
    fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>>;

    /// Returns `true` if the bucket exists and is listable.
    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    /// Create a bucket. Creating an existing bucket is a no-op.
    fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Delete an empty bucket.
    fn delete_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// List all objects whose key starts with `prefix`.
    fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectMeta>>;

    /// List at most `limit` objects whose key starts with `prefix`, taken
    /// from the start of the key order.
    ///
    /// `list` materializes the whole prefix, which is expensive for large
    /// trees. Default implementation truncates `list()`. Backends should
    /// override it with a native page size.
    fn list_page(&self, bucket: &str, prefix: &str, limit: usize) -> StoreResult<Vec<ObjectMeta>> {
        let mut objects = self.list(bucket, prefix)?;
        objects.truncate(limit);
        Ok(objects)
    }

    /// Fetch metadata for a single key, `Ok(None)` if absent.
    fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>>;

    /// Fetch the full content of a key, `Ok(None)` if absent.
    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Fetch up to `length` bytes starting at `offset`.
    ///
    /// Reads past the end are clipped; an offset past the end yields an
    /// empty buffer. Default implementation slices `get_object()`. Backends
    /// may override with a native ranged GET.
    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.get_object(bucket, key)?.map(|data| {
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
            let end = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX));
            data[start..end.min(data.len())].to_vec()
        }))
    }

    /// Write an object, replacing any existing one.
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Delete a single key. Deleting a missing key is a no-op.
    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Delete many keys in one request.
    ///
    /// Per-key failures are reported in the returned [`DeleteReport`], not
    /// as an `Err`; `Err` is reserved for failures of the request as a
    /// whole. Default implementation calls `delete_object()` for each key.
    fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<DeleteReport> {
        let mut report = DeleteReport::default();
        for key in keys {
            match self.delete_object(bucket, key) {
                Ok(()) => report.deleted.push(key.clone()),
                Err(StoreError::NoSuchBucket(name)) => return Err(StoreError::NoSuchBucket(name)),
                Err(e) => report.failed.push(DeleteFailure {
                    key: key.clone(),
                    message: e.to_string(),
                }),
            }
        }
        Ok(report)
    }

    /// Server-side copy of one object, replacing the destination.
    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()>;

    /// Start a multipart upload for `bucket/key`.
    fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<MultipartUpload>;

    /// Upload one part. Part numbers start at 1.
    fn upload_part(&self, upload: &MultipartUpload, part_number: u32, data: &[u8]) -> StoreResult<()>;

    /// Assemble all uploaded parts, in part-number order, into the object.
    fn complete_multipart_upload(&self, upload: &MultipartUpload) -> StoreResult<()>;

    /// Discard an upload and its parts.
    fn abort_multipart_upload(&self, upload: &MultipartUpload) -> StoreResult<()>;
}
