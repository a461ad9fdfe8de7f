//! Hierarchical filesystem semantics on a flat object store.
//!
//! Object stores only know buckets and keys. This crate rebuilds
//! directories, recursive delete, copy, rename and stat on top of them
//! using prefix listings, zero-byte directory markers and batch calls.
//!
//! # Paths
//!
//! Paths take the form `s3a://`, `s3a://bucket` or `s3a://bucket/key`; a
//! trailing `/` marks directory intent. The scheme is configurable through
//! [`FsConfig`].
//!
//! # Directories
//!
//! A directory exists if a marker object `key/` exists or any key starts
//! with `key/`. Classification is recomputed from the store on every call.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bucketfs_core::BucketFs;
//! use bucketfs_store::InMemoryObjectStore;
//!
//! let fs = BucketFs::new(Arc::new(InMemoryObjectStore::with_buckets(["gethue"])));
//! fs.mkdir("s3a://gethue/logs").unwrap();
//! fs.create("s3a://gethue/logs/today.txt", b"hello").unwrap();
//!
//! assert!(fs.isdir("s3a://gethue/logs").unwrap());
//! assert_eq!(fs.listdir("s3a://gethue/logs").unwrap(), vec!["today.txt"]);
//!
//! fs.rename("s3a://gethue/logs", "s3a://gethue/archive").unwrap();
//! assert!(!fs.exists("s3a://gethue/logs").unwrap());
//! assert_eq!(fs.read("s3a://gethue/archive/today.txt", 0, 5).unwrap(), b"hello");
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod fs;
pub mod recursive;
pub mod stat;
pub mod upload;
pub mod uri;

pub use config::{FsConfig, DEFAULT_SCHEME, MAX_DELETE_BATCH};
pub use directory::{classify, ListingEntry, NodeKind};
pub use error::{FsError, FsResult};
pub use fs::BucketFs;
pub use recursive::{plan_tree, Transfer, TransferPlan};
pub use stat::StatRecord;
pub use upload::{ObjectReader, UploadWriter, DEFAULT_WRITE_SIZE};
pub use uri::{is_object_uri, join, normpath, parse_uri, ObjectPath};
