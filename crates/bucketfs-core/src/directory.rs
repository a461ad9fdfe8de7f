//! Directories emulated on a flat key space.
//!
//! The store has no directory entity. A directory exists when either
//! - a zero-byte marker object `key/` exists, or
//! - any object key starts with `key/` (an implicit directory).
//!
//! Whether a path is a file, a directory or absent is always recomputed
//! from a HEAD of the exact key plus a listing of `key/`, via the pure
//! function [`classify`]. Nothing is cached.

use std::collections::HashMap;

use bucketfs_store::{ObjectMeta, StoreError};
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::fs::{absent_if_no_bucket, BucketFs};
use crate::stat::StatRecord;
use crate::uri::{ObjectPath, SEPARATOR};

/// What a key resolves to, derived from live listing results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Nothing at the key, nothing under `key/`.
    Missing,
    /// An object at the exact key and nothing under `key/`.
    File(ObjectMeta),
    /// A marker at `key/` or at least one object under it.
    Directory {
        /// The `key/` marker object, if one exists.
        marker: Option<ObjectMeta>,
        /// An object at the exact key shadowed by the directory.
        file: Option<ObjectMeta>,
        /// Every object under `key/` except the marker, in key order.
        descendants: Vec<ObjectMeta>,
    },
}

impl NodeKind {
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

/// Classify `key` from the HEAD result for the exact key and a listing
/// of the `key/` prefix.
///
/// Entries in `listing` outside `key/` are ignored.
pub fn classify(key: &str, exact: Option<ObjectMeta>, listing: Vec<ObjectMeta>) -> NodeKind {
    let prefix = format!("{key}{SEPARATOR}");
    let mut marker = None;
    let mut descendants = Vec::new();
    for meta in listing {
        if meta.key == prefix {
            marker = Some(meta);
        } else if meta.key.starts_with(&prefix) {
            descendants.push(meta);
        }
    }
    if marker.is_some() || !descendants.is_empty() {
        NodeKind::Directory {
            marker,
            file: exact,
            descendants,
        }
    } else {
        match exact {
            Some(meta) => NodeKind::File(meta),
            None => NodeKind::Missing,
        }
    }
}

/// One immediate child of a listed directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    /// Child name, without any separator.
    pub name: String,
    /// Object stored at exactly `prefix + name`.
    pub object: Option<ObjectMeta>,
    /// Marker stored at `prefix + name + "/"`.
    pub marker: Option<ObjectMeta>,
    /// Whether anything besides the marker lives under `prefix + name + "/"`.
    pub has_children: bool,
}

impl ListingEntry {
    pub fn is_dir(&self) -> bool {
        self.marker.is_some() || self.has_children
    }
}

/// Collapse a prefix listing to its immediate children.
///
/// Names are de-duplicated and keep the order in which they first appear
/// in `listing`. The marker for `prefix` itself is not a child.
pub fn immediate_children(prefix: &str, listing: &[ObjectMeta]) -> Vec<ListingEntry> {
    let mut entries: Vec<ListingEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for meta in listing {
        let Some(rel) = meta.key.strip_prefix(prefix) else {
            continue;
        };
        let (name, rest) = match rel.split_once(SEPARATOR) {
            Some((name, rest)) => (name, Some(rest)),
            None => (rel, None),
        };
        if name.is_empty() {
            continue;
        }
        let slot = *index.entry(name.to_string()).or_insert_with(|| {
            entries.push(ListingEntry {
                name: name.to_string(),
                object: None,
                marker: None,
                has_children: false,
            });
            entries.len() - 1
        });
        let entry = &mut entries[slot];
        match rest {
            None => entry.object = Some(meta.clone()),
            Some("") => entry.marker = Some(meta.clone()),
            Some(_) => entry.has_children = true,
        }
    }
    entries
}

impl BucketFs {
    /// Resolve a keyed path against the store.
    ///
    /// A path written with a trailing `/` only ever resolves to a directory:
    /// an object at the bare key does not count.
    pub(crate) fn resolve(&self, path: &ObjectPath) -> FsResult<NodeKind> {
        self.resolve_listing(path, None)
    }

    /// Resolve the kind of `path` without materializing its subtree.
    ///
    /// Lists a single object under `key/`. The marker sorts first, so a
    /// returned `Directory` carries its marker but at most one descendant.
    pub(crate) fn probe(&self, path: &ObjectPath) -> FsResult<NodeKind> {
        self.resolve_listing(path, Some(1))
    }

    fn resolve_listing(&self, path: &ObjectPath, limit: Option<usize>) -> FsResult<NodeKind> {
        let (Some(bucket), Some(key)) = (path.bucket(), path.key()) else {
            return Err(FsError::invalid_operation(path, "path has no key"));
        };
        let exact = if path.has_trailing_separator() {
            None
        } else {
            absent_if_no_bucket(self.store.head_object(bucket, key))?
        };
        let prefix = path.dir_prefix();
        let listing = match limit {
            Some(limit) => self.store.list_page(bucket, &prefix, limit),
            None => self.store.list(bucket, &prefix),
        };
        let listing = match listing {
            Ok(listing) => listing,
            Err(StoreError::NoSuchBucket(_)) => return Ok(NodeKind::Missing),
            Err(e) => return Err(e.into()),
        };
        Ok(classify(key, exact, listing))
    }

    /// Returns `true` if anything exists at `path`.
    pub fn exists(&self, path: &str) -> FsResult<bool> {
        let path = self.parse(path)?;
        self.exists_path(&path)
    }

    pub(crate) fn exists_path(&self, path: &ObjectPath) -> FsResult<bool> {
        match path.bucket() {
            None => Ok(true),
            Some(bucket) if path.is_bucket_root() => Ok(self.store.bucket_exists(bucket)?),
            Some(_) => Ok(self.probe(path)?.exists()),
        }
    }

    /// Returns `true` if `path` is the root, an existing bucket, or a
    /// directory (marker or implicit prefix).
    pub fn isdir(&self, path: &str) -> FsResult<bool> {
        let path = self.parse(path)?;
        self.isdir_path(&path)
    }

    pub(crate) fn isdir_path(&self, path: &ObjectPath) -> FsResult<bool> {
        if path.key().is_none() {
            return self.exists_path(path);
        }
        Ok(self.probe(path)?.is_dir())
    }

    /// Returns `true` if an object exists at `path` and nothing lives
    /// below it.
    pub fn isfile(&self, path: &str) -> FsResult<bool> {
        let path = self.parse(path)?;
        if path.key().is_none() {
            return Ok(false);
        }
        Ok(self.probe(&path)?.is_file())
    }

    /// Create a directory.
    ///
    /// Writes a zero-byte marker at `key/`; on a bucket root, creates the
    /// bucket. Both are idempotent.
    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        let path = self.parse(path)?;
        match (path.bucket(), path.marker_key()) {
            (None, _) => Err(FsError::invalid_operation(&path, "cannot create the store root")),
            (Some(bucket), None) => {
                self.store.create_bucket(bucket)?;
                debug!(bucket, "bucket created");
                Ok(())
            }
            (Some(bucket), Some(marker)) => {
                self.store.put_object(bucket, &marker, &[])?;
                debug!(bucket, marker = %marker, "directory marker written");
                Ok(())
            }
        }
    }

    /// Names of the immediate children of `path`.
    ///
    /// At the store root these are bucket names.
    pub fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = self.parse(path)?;
        if path.is_root() {
            return Ok(self
                .store
                .list_buckets()?
                .into_iter()
                .map(|b| b.name)
                .collect());
        }
        Ok(self
            .list_entries(&path)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// Stat records for the immediate children of `path`, computed from
    /// the same listing as [`listdir`](Self::listdir).
    pub fn listdir_stats(&self, path: &str) -> FsResult<Vec<StatRecord>> {
        let path = self.parse(path)?;
        if path.is_root() {
            return Ok(self
                .store
                .list_buckets()?
                .into_iter()
                .map(|b| StatRecord::for_bucket(&ObjectPath::bucket_root(path.scheme(), &b.name)))
                .collect());
        }
        let entries = self.list_entries(&path)?;
        entries
            .iter()
            .map(|entry| Ok(StatRecord::for_entry(&path.child(&entry.name)?, entry)))
            .collect()
    }

    /// Immediate children of a bucket root or directory.
    pub(crate) fn list_entries(&self, path: &ObjectPath) -> FsResult<Vec<ListingEntry>> {
        let Some(bucket) = path.bucket() else {
            return Err(FsError::invalid_operation(path, "the store root lists buckets"));
        };
        let prefix = path.dir_prefix();
        let listing = if path.is_bucket_root() {
            match self.store.list(bucket, &prefix) {
                Ok(listing) => listing,
                Err(StoreError::NoSuchBucket(_)) => return Err(FsError::NotFound(path.to_string())),
                Err(e) => return Err(e.into()),
            }
        } else {
            match self.resolve(path)? {
                NodeKind::Missing => return Err(FsError::NotFound(path.to_string())),
                NodeKind::File(_) => return Err(FsError::NotADirectory(path.to_string())),
                NodeKind::Directory { descendants, .. } => descendants,
            }
        };
        Ok(immediate_children(&prefix, &listing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testing::*;
    use bucketfs_store::{ObjectStore, StoreCall};
    use chrono::Utc;

    fn meta(key: &str, size: u64) -> ObjectMeta {
        ObjectMeta::new(key, size, Utc::now())
    }

    // -----------------------------------------------------------------------
    // Pure classification
    // -----------------------------------------------------------------------

    #[test]
    fn classify_missing_file_and_directories() {
        assert_eq!(classify("d", None, vec![]), NodeKind::Missing);
        assert!(classify("d", Some(meta("d", 3)), vec![]).is_file());
        assert!(classify("d", None, vec![meta("d/", 0)]).is_dir());
        assert!(classify("d", None, vec![meta("d/x", 1)]).is_dir());
    }

    #[test]
    fn classify_separates_marker_and_descendants() {
        let kind = classify(
            "d",
            Some(meta("d", 2)),
            vec![meta("d/", 0), meta("d/a", 1), meta("d/b/", 0), meta("dx", 1)],
        );
        match kind {
            NodeKind::Directory { marker, file, descendants } => {
                assert_eq!(marker.unwrap().key, "d/");
                assert_eq!(file.unwrap().key, "d");
                let keys: Vec<_> = descendants.iter().map(|m| m.key.as_str()).collect();
                assert_eq!(keys, vec!["d/a", "d/b/"]);
            }
            other => panic!("expected directory, got {other:?}"),
        }
    }

    #[test]
    fn immediate_children_collapse_and_dedupe() {
        let listing = vec![
            meta("d/", 0),
            meta("d/a.txt", 1),
            meta("d/sub/", 0),
            meta("d/sub/x", 1),
            meta("d/sub/y/z", 1),
            meta("d/sub", 4),
            meta("d/z", 1),
        ];
        let entries = immediate_children("d/", &listing);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub", "z"]);
        let sub = &entries[1];
        assert!(sub.is_dir());
        assert!(sub.marker.is_some());
        assert!(sub.object.is_some());
        assert!(sub.has_children);
        assert!(!entries[0].is_dir());
    }

    // -----------------------------------------------------------------------
    // exists / isdir / isfile
    // -----------------------------------------------------------------------

    #[test]
    fn files_exist_and_are_not_directories() {
        let (store, fs) = fixture();
        seed(&store, &[("data/file", "hello"), ("top", "x")]);

        for key in ["data/file", "top"] {
            assert!(fs.exists(&path(key)).unwrap());
            assert!(!fs.isdir(&path(key)).unwrap());
            assert!(fs.isfile(&path(key)).unwrap());
        }
    }

    #[test]
    fn implicit_directory_exists() {
        let (store, fs) = fixture();
        seed(&store, &[("test_exists/file", "")]);

        assert!(fs.exists(&path("test_exists")).unwrap());
        assert!(fs.isdir(&path("test_exists")).unwrap());
        assert!(!fs.isfile(&path("test_exists")).unwrap());
        assert!(!fs.exists(&path("test_exist")).unwrap());
    }

    #[test]
    fn root_and_bucket_existence() {
        let (_store, fs) = fixture();
        assert!(fs.exists("s3a://").unwrap());
        assert!(fs.isdir("s3a://").unwrap());
        assert!(fs.exists("s3a://gethue").unwrap());
        assert!(fs.isdir("s3a://gethue").unwrap());
        assert!(!fs.exists("s3a://fakebucket").unwrap());
        assert!(!fs.exists("s3a://fakebucket/key").unwrap());
        assert!(!fs.isfile("s3a://gethue").unwrap());
    }

    #[test]
    fn trailing_separator_ignores_plain_object() {
        let (store, fs) = fixture();
        seed(&store, &[("plain", "x")]);
        assert!(fs.exists(&path("plain")).unwrap());
        assert!(!fs.exists(&path("plain/")).unwrap());
    }

    // -----------------------------------------------------------------------
    // mkdir
    // -----------------------------------------------------------------------

    #[test]
    fn mkdir_writes_marker_and_is_idempotent() {
        let (store, fs) = fixture();
        let dir = path("test_mkdir");
        assert!(!fs.exists(&dir).unwrap());

        fs.mkdir(&dir).unwrap();
        fs.mkdir(&dir).unwrap();

        assert!(fs.exists(&dir).unwrap());
        assert!(fs.isdir(&dir).unwrap());
        assert_eq!(store.keys(BUCKET), vec!["test_mkdir/"]);
        let marker = store.head_object(BUCKET, "test_mkdir/").unwrap().unwrap();
        assert_eq!(marker.size, 0);
    }

    #[test]
    fn probe_lists_one_object_under_the_prefix() {
        let (store, fs) = fixture();
        seed(&store, &[("big/", ""), ("big/a", "1"), ("big/b", "2"), ("big/c", "3"), ("implicit/x", "4")]);

        match fs.probe(&fs.parse(&path("big")).unwrap()).unwrap() {
            NodeKind::Directory { marker, descendants, .. } => {
                assert_eq!(marker.map(|m| m.key), Some("big/".to_string()));
                assert!(descendants.is_empty());
            }
            other => panic!("expected a directory, got {other:?}"),
        }
        match fs.probe(&fs.parse(&path("implicit")).unwrap()).unwrap() {
            NodeKind::Directory { marker, descendants, .. } => {
                assert!(marker.is_none());
                assert_eq!(descendants.len(), 1);
            }
            other => panic!("expected a directory, got {other:?}"),
        }
        assert!(fs.isdir(&path("big")).unwrap());
        assert!(fs.stats(&path("big")).unwrap().is_dir);

        match fs.resolve(&fs.parse(&path("big")).unwrap()).unwrap() {
            NodeKind::Directory { descendants, .. } => assert_eq!(descendants.len(), 3),
            other => panic!("expected a directory, got {other:?}"),
        }
    }

    #[test]
    fn mkdir_on_bucket_root_creates_bucket() {
        let (store, fs) = fixture();
        fs.mkdir("s3a://new-bucket").unwrap();
        assert!(store.bucket_exists("new-bucket").unwrap());
        assert!(fs.exists("s3a://new-bucket").unwrap());
        assert!(matches!(fs.mkdir("s3a://"), Err(FsError::InvalidOperation { .. })));
    }

    // -----------------------------------------------------------------------
    // listdir
    // -----------------------------------------------------------------------

    #[test]
    fn listdir_immediate_children_in_listing_order() {
        let (store, fs) = fixture();
        seed(
            &store,
            &[
                ("dir/", ""),
                ("dir/b.txt", "b"),
                ("dir/a/", ""),
                ("dir/a/deep", "x"),
                ("dir/c/inner", "y"),
            ],
        );
        assert_eq!(fs.listdir(&path("dir")).unwrap(), vec!["a", "b.txt", "c"]);
        assert!(store
            .calls()
            .contains(&StoreCall::List { bucket: BUCKET.into(), prefix: "dir/".into() }));
    }

    #[test]
    fn listdir_bucket_and_root() {
        let (store, fs) = fixture();
        seed(&store, &[("one", "1"), ("two/x", "2")]);
        assert_eq!(fs.listdir("s3a://gethue").unwrap(), vec!["one", "two"]);
        store.create_bucket("second").unwrap();
        assert_eq!(fs.listdir("s3a://").unwrap(), vec!["gethue", "second"]);
    }

    #[test]
    fn listdir_empty_directory() {
        let (_store, fs) = fixture();
        fs.mkdir(&path("empty")).unwrap();
        assert!(fs.listdir(&path("empty")).unwrap().is_empty());
    }

    #[test]
    fn listdir_errors() {
        let (store, fs) = fixture();
        seed(&store, &[("file", "x")]);
        assert!(matches!(fs.listdir(&path("missing")), Err(FsError::NotFound(_))));
        assert!(matches!(fs.listdir(&path("file")), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.listdir("s3a://nobucket"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn listdir_stats_matches_listdir() {
        let (store, fs) = fixture();
        seed(&store, &[("dir/file_one.txt", "foo"), ("dir/sub/", ""), ("dir/file_two.txt", "barbaz")]);

        let stats = fs.listdir_stats(&path("dir")).unwrap();
        let names: Vec<_> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, fs.listdir(&path("dir")).unwrap());

        let two = stats.iter().find(|s| s.name == "file_two.txt").unwrap();
        assert!(!two.is_dir);
        assert_eq!(two.size, 6);
        assert_eq!(two.path, path("dir/file_two.txt"));
        let sub = stats.iter().find(|s| s.name == "sub").unwrap();
        assert!(sub.is_dir);
        assert_eq!(sub.size, 0);
    }

    #[test]
    fn listdir_stats_at_root_lists_buckets() {
        let (_store, fs) = fixture();
        let stats = fs.listdir_stats("s3a://").unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].is_dir);
        assert_eq!(stats[0].path, "s3a://gethue");
    }
}
