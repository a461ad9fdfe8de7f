use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{BucketInfo, DeleteFailure, DeleteReport, MultipartUpload, ObjectMeta};
use crate::traits::ObjectStore;

/// One call made against an [`InMemoryObjectStore`], in arrival order.
///
/// Tests use the call log to assert which store primitives a filesystem
/// operation issued (for example, that deleting an empty directory never
/// reaches `delete_objects`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    ListBuckets,
    BucketExists { bucket: String },
    CreateBucket { bucket: String },
    DeleteBucket { bucket: String },
    List { bucket: String, prefix: String },
    Head { bucket: String, key: String },
    Get { bucket: String, key: String },
    GetRange { bucket: String, key: String, offset: u64, length: u64 },
    Put { bucket: String, key: String, size: u64 },
    DeleteObject { bucket: String, key: String },
    DeleteObjects { bucket: String, keys: Vec<String> },
    Copy { src_bucket: String, src_key: String, dst_bucket: String, dst_key: String },
    CreateMultipartUpload { bucket: String, key: String },
    UploadPart { upload_id: String, part_number: u32, size: u64 },
    CompleteMultipartUpload { upload_id: String },
    AbortMultipartUpload { upload_id: String },
}

impl StoreCall {
    /// Returns `true` for calls that modify the store.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::ListBuckets
                | Self::BucketExists { .. }
                | Self::List { .. }
                | Self::Head { .. }
                | Self::Get { .. }
                | Self::GetRange { .. }
        )
    }

    /// Returns `true` for single or batch deletes.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteObject { .. } | Self::DeleteObjects { .. })
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            last_modified: Utc::now(),
        }
    }

    fn meta(&self, key: &str) -> ObjectMeta {
        ObjectMeta::new(key, self.data.len() as u64, self.last_modified)
    }
}

#[derive(Debug)]
struct Bucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, Vec<u8>>,
}

/// Keys on which the store refuses to operate.
#[derive(Debug, Default)]
struct Faults {
    copy_sources: HashSet<String>,
    deletes: HashSet<String>,
    writes: HashSet<String>,
    unlisted: HashSet<String>,
}

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. Buckets and objects are held behind a
/// `RwLock`; every call is appended to a call log and individual keys can be
/// made to fail on copy, delete or write, or left out of listings.
pub struct InMemoryObjectStore {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    uploads: RwLock<HashMap<String, PendingUpload>>,
    calls: Mutex<Vec<StoreCall>>,
    faults: RwLock<Faults>,
}

impl InMemoryObjectStore {
    /// Create a new empty store with no buckets.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            uploads: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            faults: RwLock::new(Faults::default()),
        }
    }

    /// Create a store with the given buckets already present.
    pub fn with_buckets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut buckets) = store.buckets.write() {
            for name in names {
                buckets.insert(
                    name.into(),
                    Bucket {
                        created: Utc::now(),
                        objects: BTreeMap::new(),
                    },
                );
            }
        }
        store
    }

    /// Total number of objects across all buckets.
    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .map(|b| b.values().map(|bucket| bucket.objects.len()).sum())
            .unwrap_or(0)
    }

    /// Returns `true` if no bucket holds any object.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted keys in `bucket`, empty if the bucket does not exist.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .ok()
            .and_then(|b| b.get(bucket).map(|bucket| bucket.objects.keys().cloned().collect()))
            .unwrap_or_default()
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.uploads.read().map(|u| u.len()).unwrap_or(0)
    }

    /// Snapshot of every call made so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Forget recorded calls (typically after seeding fixtures).
    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Make every copy whose source is `key` fail.
    pub fn fail_copy_from(&self, key: impl Into<String>) {
        if let Ok(mut faults) = self.faults.write() {
            faults.copy_sources.insert(key.into());
        }
    }

    /// Make every delete of `key` fail, single or batched.
    pub fn fail_delete_of(&self, key: impl Into<String>) {
        if let Ok(mut faults) = self.faults.write() {
            faults.deletes.insert(key.into());
        }
    }

    /// Make every write to `key` fail, including multipart parts.
    pub fn fail_write_to(&self, key: impl Into<String>) {
        if let Ok(mut faults) = self.faults.write() {
            faults.writes.insert(key.into());
        }
    }

    /// Leave `key` out of every listing while it stays readable by HEAD
    /// and GET, like a write that a listing has not caught up with yet.
    pub fn hide_from_listing(&self, key: impl Into<String>) {
        if let Ok(mut faults) = self.faults.write() {
            faults.unlisted.insert(key.into());
        }
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.write() {
            *faults = Faults::default();
        }
    }

    fn record(&self, call: StoreCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn read_buckets(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Bucket>>> {
        self.buckets
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_buckets(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Bucket>>> {
        self.buckets
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_uploads(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, PendingUpload>>> {
        self.uploads
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn check_fault(&self, select: impl Fn(&Faults) -> &HashSet<String>, key: &str, op: &str) -> StoreResult<()> {
        let faults = self
            .faults
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;
        if select(&faults).contains(key) {
            return Err(StoreError::Backend(format!("injected {op} failure for {key}")));
        }
        Ok(())
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>> {
        self.record(StoreCall::ListBuckets);
        let buckets = self.read_buckets()?;
        Ok(buckets
            .iter()
            .map(|(name, b)| BucketInfo {
                name: name.clone(),
                created: b.created,
            })
            .collect())
    }

    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        self.record(StoreCall::BucketExists {
            bucket: bucket.to_string(),
        });
        Ok(self.read_buckets()?.contains_key(bucket))
    }

    fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.record(StoreCall::CreateBucket {
            bucket: bucket.to_string(),
        });
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StoreError::InvalidBucketName {
                name: bucket.to_string(),
                reason: "must be non-empty and contain no '/'".into(),
            });
        }
        let mut buckets = self.write_buckets()?;
        buckets.entry(bucket.to_string()).or_insert_with(|| Bucket {
            created: Utc::now(),
            objects: BTreeMap::new(),
        });
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.record(StoreCall::DeleteBucket {
            bucket: bucket.to_string(),
        });
        let mut buckets = self.write_buckets()?;
        match buckets.get(bucket) {
            None => Err(StoreError::NoSuchBucket(bucket.to_string())),
            Some(b) if !b.objects.is_empty() => Err(StoreError::BucketNotEmpty(bucket.to_string())),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.list_page(bucket, prefix, usize::MAX)
    }

    fn list_page(&self, bucket: &str, prefix: &str, limit: usize) -> StoreResult<Vec<ObjectMeta>> {
        self.record(StoreCall::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        });
        let faults = self
            .faults
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;
        let buckets = self.read_buckets()?;
        let b = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        Ok(b.objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| !faults.unlisted.contains(*key))
            .take(limit)
            .map(|(key, obj)| obj.meta(key))
            .collect())
    }

    fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>> {
        self.record(StoreCall::Head {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let buckets = self.read_buckets()?;
        let b = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        Ok(b.objects.get(key).map(|obj| obj.meta(key)))
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.record(StoreCall::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let buckets = self.read_buckets()?;
        let b = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        Ok(b.objects.get(key).map(|obj| obj.data.clone()))
    }

    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.record(StoreCall::GetRange {
            bucket: bucket.to_string(),
            key: key.to_string(),
            offset,
            length,
        });
        let buckets = self.read_buckets()?;
        let b = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        Ok(b.objects.get(key).map(|obj| {
            let len = obj.data.len();
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
            let end = start
                .saturating_add(usize::try_from(length).unwrap_or(usize::MAX))
                .min(len);
            obj.data[start..end].to_vec()
        }))
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StoreResult<()> {
        self.record(StoreCall::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
        });
        self.check_fault(|f| &f.writes, key, "write")?;
        let mut buckets = self.write_buckets()?;
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        b.objects.insert(key.to_string(), StoredObject::new(data.to_vec()));
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.record(StoreCall::DeleteObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        self.check_fault(|f| &f.deletes, key, "delete")?;
        let mut buckets = self.write_buckets()?;
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        b.objects.remove(key);
        Ok(())
    }

    fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<DeleteReport> {
        self.record(StoreCall::DeleteObjects {
            bucket: bucket.to_string(),
            keys: keys.to_vec(),
        });
        let mut report = DeleteReport::default();
        let mut buckets = self.write_buckets()?;
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        for key in keys {
            if let Err(e) = self.check_fault(|f| &f.deletes, key, "delete") {
                report.failed.push(DeleteFailure {
                    key: key.clone(),
                    message: e.to_string(),
                });
                continue;
            }
            b.objects.remove(key);
            report.deleted.push(key.clone());
        }
        Ok(report)
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()> {
        self.record(StoreCall::Copy {
            src_bucket: src_bucket.to_string(),
            src_key: src_key.to_string(),
            dst_bucket: dst_bucket.to_string(),
            dst_key: dst_key.to_string(),
        });
        self.check_fault(|f| &f.copy_sources, src_key, "copy")?;
        self.check_fault(|f| &f.writes, dst_key, "write")?;
        let mut buckets = self.write_buckets()?;
        let data = buckets
            .get(src_bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(src_bucket.to_string()))?
            .objects
            .get(src_key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NoSuchKey {
                bucket: src_bucket.to_string(),
                key: src_key.to_string(),
            })?;
        let dst = buckets
            .get_mut(dst_bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(dst_bucket.to_string()))?;
        dst.objects.insert(dst_key.to_string(), StoredObject::new(data));
        Ok(())
    }

    fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<MultipartUpload> {
        self.record(StoreCall::CreateMultipartUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if !self.read_buckets()?.contains_key(bucket) {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        let upload = MultipartUpload::new(bucket, key);
        self.write_uploads()?.insert(
            upload.upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        debug!(bucket, key, upload_id = %upload.upload_id, "multipart upload created");
        Ok(upload)
    }

    fn upload_part(&self, upload: &MultipartUpload, part_number: u32, data: &[u8]) -> StoreResult<()> {
        self.record(StoreCall::UploadPart {
            upload_id: upload.upload_id.clone(),
            part_number,
            size: data.len() as u64,
        });
        self.check_fault(|f| &f.writes, &upload.key, "write")?;
        let mut uploads = self.write_uploads()?;
        let pending = uploads
            .get_mut(&upload.upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(upload.upload_id.clone()))?;
        pending.parts.insert(part_number, data.to_vec());
        Ok(())
    }

    fn complete_multipart_upload(&self, upload: &MultipartUpload) -> StoreResult<()> {
        self.record(StoreCall::CompleteMultipartUpload {
            upload_id: upload.upload_id.clone(),
        });
        let pending = self
            .write_uploads()?
            .remove(&upload.upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(upload.upload_id.clone()))?;
        if pending.parts.is_empty() {
            return Err(StoreError::InvalidUpload {
                upload_id: upload.upload_id.clone(),
                reason: "no parts uploaded".into(),
            });
        }
        for (expected, number) in (1u32..).zip(pending.parts.keys()) {
            if *number != expected {
                return Err(StoreError::InvalidUpload {
                    upload_id: upload.upload_id.clone(),
                    reason: format!("missing part {expected}"),
                });
            }
        }
        let data: Vec<u8> = pending.parts.into_values().flatten().collect();
        let mut buckets = self.write_buckets()?;
        let b = buckets
            .get_mut(&pending.bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(pending.bucket.clone()))?;
        b.objects.insert(pending.key, StoredObject::new(data));
        Ok(())
    }

    fn abort_multipart_upload(&self, upload: &MultipartUpload) -> StoreResult<()> {
        self.record(StoreCall::AbortMultipartUpload {
            upload_id: upload.upload_id.clone(),
        });
        self.write_uploads()?
            .remove(&upload.upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoSuchUpload(upload.upload_id.clone()))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.read().map(|b| b.len()).unwrap_or(0);
        f.debug_struct("InMemoryObjectStore")
            .field("bucket_count", &buckets)
            .field("object_count", &self.len())
            .finish()
    }
}
