//! Flat object storage for bucketfs.
//!
//! This crate defines the one capability the filesystem layer depends on: a
//! bucket/key object store with no notion of directories. Keys are opaque
//! strings; `/` is just another character.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and
//!   embedding, with a call log and fault injection
//! - [`LocalObjectStore`] -- flat, hex-named files under a local directory
//!
//! # Design Rules
//!
//! 1. Listings are always in ascending key order.
//! 2. Writes and copies replace whatever is at the destination key.
//! 3. Batch deletes report per-key failures instead of failing as a whole.
//! 4. The store never retries; errors are propagated unmodified.

pub mod error;
pub mod local;
pub mod memory;
pub mod object;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use local::LocalObjectStore;
pub use memory::{InMemoryObjectStore, StoreCall};
pub use object::{BucketInfo, DeleteFailure, DeleteReport, MultipartUpload, ObjectMeta};
pub use traits::ObjectStore;
