use std::sync::Arc;

use bucketfs_store::{ObjectStore, StoreError, StoreResult};
use tracing::debug;

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::uri::{self, ObjectPath};

/// Hierarchical filesystem view of a flat object store.
///
/// `BucketFs` owns no state besides its configuration: every answer is
/// computed from live store calls, so two instances over the same store
/// always agree. Operations are split across modules by concern:
///
/// - [`directory`](crate::directory) -- existence, listing, `mkdir`
/// - [`recursive`](crate::recursive) -- `rmtree`, `copy`, `rename`
/// - [`stat`](crate::stat) -- `stats`
/// - [`upload`](crate::upload) -- `create`, `open`, `read`
pub struct BucketFs {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) config: FsConfig,
}

impl std::fmt::Debug for BucketFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketFs")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BucketFs {
    /// Create a filesystem over `store` with the default configuration.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            config: FsConfig::default(),
        }
    }

    /// Create a filesystem over `store`, validating `config` first.
    pub fn with_config(store: Arc<dyn ObjectStore>, config: FsConfig) -> FsResult<Self> {
        config.validate()?;
        debug!(
            scheme = %config.scheme,
            write_chunk_size = config.write_chunk_size,
            delete_batch_size = config.delete_batch_size,
            "bucketfs configured"
        );
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Size of each chunk the upload path writes.
    pub fn upload_chunk_size(&self) -> usize {
        self.config.write_chunk_size
    }

    /// Parse `path` under the configured scheme.
    pub fn parse(&self, path: &str) -> FsResult<ObjectPath> {
        ObjectPath::parse(path, &self.config.scheme)
    }

    /// Join key segments onto `base` (see [`uri::join`]).
    pub fn join(&self, base: &str, parts: &[&str]) -> String {
        uri::join(base, parts)
    }

    /// The store root path, `scheme://`.
    pub fn root(&self) -> ObjectPath {
        ObjectPath::root(&self.config.scheme)
    }
}

/// Treat a missing bucket as a missing object.
///
/// Lookups below a bucket that does not exist answer "absent" rather than
/// failing, so `exists("s3a://nope/key")` is simply `false`.
pub(crate) fn absent_if_no_bucket<T>(result: StoreResult<Option<T>>) -> StoreResult<Option<T>> {
    match result {
        Err(StoreError::NoSuchBucket(_)) => Ok(None),
        other => other,
    }
}

/// Split a path into its bucket and key, failing for root and bucket paths.
pub(crate) fn require_key<'p>(path: &'p ObjectPath, reason: &str) -> FsResult<(&'p str, &'p str)> {
    match (path.bucket(), path.key()) {
        (Some(bucket), Some(key)) => Ok((bucket, key)),
        _ => Err(FsError::invalid_operation(path, reason)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use bucketfs_store::{InMemoryObjectStore, ObjectStore};

    use super::BucketFs;
    use crate::config::FsConfig;

    pub(crate) const BUCKET: &str = "gethue";

    /// A filesystem over an in-memory store holding one empty bucket.
    pub(crate) fn fixture() -> (Arc<InMemoryObjectStore>, BucketFs) {
        fixture_with(FsConfig::default())
    }

    pub(crate) fn fixture_with(config: FsConfig) -> (Arc<InMemoryObjectStore>, BucketFs) {
        let store = Arc::new(InMemoryObjectStore::with_buckets([BUCKET]));
        let fs = BucketFs::with_config(store.clone(), config).unwrap();
        (store, fs)
    }

    /// Write raw objects straight into the store, bypassing the filesystem,
    /// then forget the calls.
    pub(crate) fn seed(store: &InMemoryObjectStore, objects: &[(&str, &str)]) {
        for (key, data) in objects {
            store.put_object(BUCKET, key, data.as_bytes()).unwrap();
        }
        store.clear_calls();
    }

    pub(crate) fn path(key: &str) -> String {
        format!("s3a://{BUCKET}/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use bucketfs_store::InMemoryObjectStore;

    #[test]
    fn with_config_validates() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let bad = FsConfig::default().with_write_chunk_size(0);
        assert!(matches!(BucketFs::with_config(store, bad), Err(FsError::Config(_))));
    }

    #[test]
    fn parse_uses_configured_scheme() {
        let (_store, fs) = fixture_with(FsConfig::default().with_scheme("gs"));
        assert!(fs.parse("gs://gethue/a").is_ok());
        assert!(fs.parse("s3a://gethue/a").is_err());
        assert_eq!(fs.root().to_string(), "gs://");
    }

    #[test]
    fn accessors() {
        let (_store, fs) = fixture_with(FsConfig::default().with_write_chunk_size(42));
        assert_eq!(fs.upload_chunk_size(), 42);
        assert_eq!(fs.join(&path("a"), &["b"]), path("a/b"));
        assert!(format!("{fs:?}").contains("BucketFs"));
    }

    #[test]
    fn require_key_rejects_roots() {
        let root = ObjectPath::root("s3a");
        assert!(require_key(&root, "needs a key").is_err());
        let file = ObjectPath::parse(&path("a/b"), "s3a").unwrap();
        assert_eq!(require_key(&file, "").unwrap(), (BUCKET, "a/b"));
    }
}
