//! Tree operations composed from listing, copying and batch deletion.
//!
//! # Rename protocol
//!
//! A rename is a copy followed by a delete, executed from a
//! [`TransferPlan`] computed up front:
//!
//! 1. copy every planned object to its destination key
//! 2. list the destination and confirm every planned key is present
//! 3. batch-delete every source key
//!
//! A failure in step 1 or 2 returns before any delete is issued, so the
//! source is never lost. The destination may keep the objects copied before
//! the failure.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::directory::NodeKind;
use crate::error::{FsError, FsResult};
use crate::fs::{absent_if_no_bucket, require_key, BucketFs};
use crate::uri::ObjectPath;
use bucketfs_store::{DeleteReport, StoreError};

/// One object copy in a [`TransferPlan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub src_key: String,
    pub dst_key: String,
}

/// Ordered object copies between two buckets, computed before anything is
/// written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferPlan {
    pub src_bucket: String,
    pub dst_bucket: String,
    pub transfers: Vec<Transfer>,
    /// Listing prefix that covers every destination key.
    pub verify_prefix: String,
}

impl TransferPlan {
    fn new(src_bucket: &str, dst_bucket: &str, verify_prefix: impl Into<String>) -> Self {
        Self {
            src_bucket: src_bucket.to_string(),
            dst_bucket: dst_bucket.to_string(),
            transfers: Vec::new(),
            verify_prefix: verify_prefix.into(),
        }
    }

    fn push(&mut self, src_key: impl Into<String>, dst_key: impl Into<String>) {
        self.transfers.push(Transfer {
            src_key: src_key.into(),
            dst_key: dst_key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Source keys, in copy order.
    pub fn source_keys(&self) -> Vec<String> {
        self.transfers.iter().map(|t| t.src_key.clone()).collect()
    }
}

/// Plan the copies that move `node` (found at `src`) to `target`.
///
/// A file maps to `target` itself. A directory maps its marker to
/// `target/`, each descendant to the same relative key under `target/`, and
/// an object shadowed at the exact source key to `target`.
pub fn plan_tree(src: &ObjectPath, node: &NodeKind, target: &ObjectPath) -> FsResult<TransferPlan> {
    let (src_bucket, src_key) = require_key(src, "only keyed paths can be copied")?;
    let (dst_bucket, dst_key) = require_key(target, "copy target needs a key")?;
    let mut plan = TransferPlan::new(src_bucket, dst_bucket, dst_key);

    match node {
        NodeKind::Missing => return Err(FsError::NotFound(src.to_string())),
        NodeKind::File(meta) => plan.push(&meta.key, dst_key),
        NodeKind::Directory {
            marker,
            file,
            descendants,
        } => {
            let src_prefix = src.dir_prefix();
            let dst_prefix = target.dir_prefix();
            if let Some(marker) = marker {
                plan.push(&marker.key, dst_prefix.clone());
            }
            for meta in descendants {
                let rel = &meta.key[src_prefix.len()..];
                plan.push(&meta.key, format!("{dst_prefix}{rel}"));
            }
            if file.is_some() {
                plan.push(src_key, dst_key);
            }
        }
    }
    Ok(plan)
}

impl BucketFs {
    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Recursively delete `path`.
    ///
    /// Only permanent deletion is available: `skip_trash = false` fails with
    /// [`FsError::Unsupported`].
    pub fn rmtree(&self, path: &str, skip_trash: bool) -> FsResult<()> {
        if !skip_trash {
            return Err(FsError::Unsupported("moving to trash".into()));
        }
        let path = self.parse(path)?;
        let Some(bucket) = path.bucket() else {
            return Err(FsError::invalid_operation(&path, "cannot delete the store root"));
        };
        if path.is_bucket_root() {
            return self.remove_bucket(&path, bucket);
        }
        let (_, key) = require_key(&path, "path has no key")?;

        match self.resolve(&path)? {
            NodeKind::Missing => Err(FsError::NotFound(path.to_string())),
            NodeKind::File(_) => {
                self.store.delete_object(bucket, key)?;
                info!(bucket, key, "object deleted");
                Ok(())
            }
            NodeKind::Directory {
                marker,
                file,
                descendants,
            } if descendants.is_empty() => {
                for meta in marker.iter().chain(file.iter()) {
                    self.store.delete_object(bucket, &meta.key)?;
                }
                info!(bucket, key, "empty directory deleted");
                Ok(())
            }
            NodeKind::Directory {
                marker,
                file,
                descendants,
            } => {
                let keys: Vec<String> = descendants
                    .into_iter()
                    .chain(marker)
                    .chain(file)
                    .map(|meta| meta.key)
                    .collect();
                let report = self.delete_keys(&path, bucket, &keys)?;
                info!(bucket, key, deleted = report.deleted.len(), "directory tree deleted");
                Ok(())
            }
        }
    }

    /// Same as [`rmtree`](Self::rmtree).
    pub fn remove(&self, path: &str, skip_trash: bool) -> FsResult<()> {
        self.rmtree(path, skip_trash)
    }

    fn remove_bucket(&self, path: &ObjectPath, bucket: &str) -> FsResult<()> {
        let keys: Vec<String> = match self.store.list(bucket, "") {
            Ok(listing) => listing.into_iter().map(|meta| meta.key).collect(),
            Err(StoreError::NoSuchBucket(_)) => return Err(FsError::NotFound(path.to_string())),
            Err(e) => return Err(e.into()),
        };
        if !keys.is_empty() {
            self.delete_keys(path, bucket, &keys)?;
        }
        self.store.delete_bucket(bucket)?;
        info!(bucket, objects = keys.len(), "bucket deleted");
        Ok(())
    }

    /// Batch-delete `keys` in chunks of the configured batch size.
    ///
    /// Every chunk is attempted; any per-key failure fails the whole call
    /// with the complete list of keys left behind.
    fn delete_keys(&self, path: &ObjectPath, bucket: &str, keys: &[String]) -> FsResult<DeleteReport> {
        let mut report = DeleteReport::default();
        for chunk in keys.chunks(self.config.delete_batch_size) {
            debug!(bucket, keys = chunk.len(), "batch delete");
            report.merge(self.store.delete_objects(bucket, chunk)?);
        }
        if !report.is_success() {
            let failed = report.failed_keys();
            warn!(path = %path, failed = failed.len(), deleted = report.deleted.len(), "batch delete incomplete");
            return Err(FsError::DeleteFailed {
                path: path.to_string(),
                failed,
            });
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Copy
    // -----------------------------------------------------------------------

    /// Copy one object to exactly `dst`, replacing what is there.
    pub fn copyfile(&self, src: &str, dst: &str) -> FsResult<()> {
        let src = self.parse(src)?;
        let dst = self.parse(dst)?;
        let (src_bucket, src_key) = require_key(&src, "only objects can be copied")?;
        let Some((dst_bucket, dst_key)) = dst.bucket().zip(dst.key()) else {
            return Err(FsError::invalid_target(&src, &dst, "destination must name an object"));
        };
        if dst.has_trailing_separator() {
            return Err(FsError::invalid_target(&src, &dst, "destination is a directory path"));
        }
        if absent_if_no_bucket(self.store.head_object(src_bucket, src_key))?.is_none() {
            return Err(FsError::NotFound(src.to_string()));
        }
        self.store.copy_object(src_bucket, src_key, dst_bucket, dst_key)?;
        debug!(src = %src, dst = %dst, "object copied");
        Ok(())
    }

    /// Copy `src` to `dst`.
    ///
    /// If `dst` is an existing directory or bucket, the copy lands at
    /// `dst/basename(src)`. Directories are only copied when `recursive` is
    /// set, and never into their own subtree.
    pub fn copy(&self, src: &str, dst: &str, recursive: bool) -> FsResult<()> {
        let src = self.parse(src)?;
        let dst = self.parse(dst)?;
        if src.key().is_none() {
            return Err(FsError::invalid_operation(&src, "cannot copy the store root or a bucket"));
        }
        let node = self.resolve(&src)?;
        match node {
            NodeKind::Missing => return Err(FsError::NotFound(src.to_string())),
            NodeKind::Directory { .. } if !recursive => {
                return Err(FsError::RecursiveCopyRequired(src.to_string()));
            }
            _ => {}
        }
        let target = self.copy_target(&src, &node, &dst)?;
        if target.same_location(&src) {
            return Err(FsError::invalid_target(&src, &dst, "source and destination are the same"));
        }
        let plan = plan_tree(&src, &node, &target)?;
        self.execute_copies(&plan)?;
        info!(src = %src, dst = %target, objects = plan.len(), "copy complete");
        Ok(())
    }

    /// Mirror every object under `src_dir/` to the same relative key under
    /// `dst_dir/`. Bucket roots are accepted on either side.
    pub fn copy_remote_dir(&self, src_dir: &str, dst_dir: &str) -> FsResult<()> {
        let src = self.parse(src_dir)?;
        let dst = self.parse(dst_dir)?;
        let (Some(src_bucket), Some(dst_bucket)) = (src.bucket(), dst.bucket()) else {
            return Err(FsError::invalid_target(&src, &dst, "the store root cannot be copied to or from"));
        };
        if src_bucket == dst_bucket && (dst.same_location(&src) || dst.is_within(&src)) {
            return Err(FsError::invalid_target(&src, &dst, "destination is inside the source"));
        }

        let src_prefix = src.dir_prefix();
        let dst_prefix = dst.dir_prefix();
        let listing = match self.store.list(src_bucket, &src_prefix) {
            Ok(listing) => listing,
            Err(StoreError::NoSuchBucket(_)) => return Err(FsError::NotFound(src.to_string())),
            Err(e) => return Err(e.into()),
        };
        if listing.is_empty() && !src.is_bucket_root() {
            return Err(FsError::NotFound(src.to_string()));
        }

        let mut plan = TransferPlan::new(src_bucket, dst_bucket, dst_prefix.clone());
        for meta in &listing {
            let dst_key = format!("{dst_prefix}{}", &meta.key[src_prefix.len()..]);
            if !dst_key.is_empty() {
                plan.push(&meta.key, dst_key);
            }
        }
        self.execute_copies(&plan)?;
        info!(src = %src, dst = %dst, objects = plan.len(), "directory copied");
        Ok(())
    }

    /// Resolve where `src` lands when copied or moved to `dst`.
    fn copy_target(&self, src: &ObjectPath, node: &NodeKind, dst: &ObjectPath) -> FsResult<ObjectPath> {
        let Some(dst_bucket) = dst.bucket() else {
            return Err(FsError::invalid_target(src, dst, "cannot write to the store root"));
        };
        let target = if dst.is_bucket_root() {
            if !self.store.bucket_exists(dst_bucket)? {
                return Err(FsError::NotFound(dst.to_string()));
            }
            self.nested_target(src, node, dst)?
        } else {
            match self.probe(dst)? {
                NodeKind::Directory { .. } => self.nested_target(src, node, dst)?,
                NodeKind::File(_) if node.is_dir() => {
                    return Err(FsError::invalid_target(src, dst, "destination is an existing file"));
                }
                NodeKind::File(_) => dst.clone(),
                NodeKind::Missing if dst.has_trailing_separator() => dst.child(src.basename())?,
                NodeKind::Missing => dst.clone(),
            }
        };
        if node.is_dir() && target.is_within(src) {
            return Err(FsError::invalid_target(src, dst, "cannot copy a directory into itself"));
        }
        Ok(target)
    }

    /// `dst/basename(src)`, refused when a node of the other kind already
    /// lives there.
    fn nested_target(&self, src: &ObjectPath, node: &NodeKind, dst: &ObjectPath) -> FsResult<ObjectPath> {
        let target = dst.child(src.basename())?;
        if target.same_location(src) {
            return Ok(target);
        }
        match self.probe(&target)? {
            NodeKind::File(_) if node.is_dir() => Err(FsError::invalid_target(
                src,
                &target,
                "a directory cannot replace an existing file",
            )),
            NodeKind::Directory { .. } if !node.is_dir() => Err(FsError::invalid_target(
                src,
                &target,
                "a file cannot replace an existing directory",
            )),
            _ => Ok(target),
        }
    }

    fn execute_copies(&self, plan: &TransferPlan) -> FsResult<()> {
        debug!(
            src_bucket = %plan.src_bucket,
            dst_bucket = %plan.dst_bucket,
            objects = plan.len(),
            "executing transfer plan"
        );
        for (done, transfer) in plan.transfers.iter().enumerate() {
            if let Err(e) = self.store.copy_object(
                &plan.src_bucket,
                &transfer.src_key,
                &plan.dst_bucket,
                &transfer.dst_key,
            ) {
                warn!(
                    src_key = %transfer.src_key,
                    dst_key = %transfer.dst_key,
                    copied = done,
                    error = %e,
                    "copy failed"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rename
    // -----------------------------------------------------------------------

    /// Move `src` to `dst` by copy, verify, then delete.
    ///
    /// Destination rules are those of [`copy`](Self::copy) in recursive
    /// mode. Renaming a path onto itself does nothing.
    pub fn rename(&self, src: &str, dst: &str) -> FsResult<()> {
        let src = self.parse(src)?;
        let dst = self.parse(dst)?;
        if src.key().is_none() {
            return Err(FsError::invalid_operation(&src, "cannot rename the store root or a bucket"));
        }
        if dst.same_location(&src) {
            return Ok(());
        }
        let node = self.resolve(&src)?;
        if !node.exists() {
            return Err(FsError::NotFound(src.to_string()));
        }
        let target = self.copy_target(&src, &node, &dst)?;
        if target.same_location(&src) {
            return Ok(());
        }
        let plan = plan_tree(&src, &node, &target)?;
        self.move_objects(&plan, &src, &target)?;
        info!(src = %src, dst = %target, objects = plan.len(), "rename complete");
        Ok(())
    }

    /// Move the contents of `src_dir` into `dst_dir`, keeping `src_dir`
    /// itself.
    pub fn rename_star(&self, src_dir: &str, dst_dir: &str) -> FsResult<()> {
        let src = self.parse(src_dir)?;
        let dst = self.parse(dst_dir)?;
        let Some(src_bucket) = src.bucket() else {
            return Err(FsError::invalid_operation(&src, "cannot move the store root"));
        };
        let Some(dst_bucket) = dst.bucket() else {
            return Err(FsError::invalid_target(&src, &dst, "cannot write to the store root"));
        };
        if src_bucket == dst_bucket && (dst.same_location(&src) || dst.is_within(&src)) {
            return Err(FsError::invalid_target(&src, &dst, "destination is inside the source"));
        }

        let descendants = if src.is_bucket_root() {
            match self.store.list(src_bucket, "") {
                Ok(listing) => listing,
                Err(StoreError::NoSuchBucket(_)) => return Err(FsError::NotADirectory(src.to_string())),
                Err(e) => return Err(e.into()),
            }
        } else {
            match self.resolve(&src)? {
                NodeKind::Directory { descendants, .. } => descendants,
                _ => return Err(FsError::NotADirectory(src.to_string())),
            }
        };
        if dst.key().is_some() && self.probe(&dst)?.is_file() {
            return Err(FsError::invalid_target(&src, &dst, "destination is an existing file"));
        }

        let src_prefix = src.dir_prefix();
        let dst_prefix = dst.dir_prefix();
        let mut plan = TransferPlan::new(src_bucket, dst_bucket, dst_prefix.clone());
        for meta in &descendants {
            plan.push(&meta.key, format!("{dst_prefix}{}", &meta.key[src_prefix.len()..]));
        }
        if plan.is_empty() {
            debug!(src = %src, "nothing to move");
            return Ok(());
        }
        self.move_objects(&plan, &src, &dst)?;
        info!(src = %src, dst = %dst, objects = plan.len(), "contents moved");
        Ok(())
    }

    fn move_objects(&self, plan: &TransferPlan, src: &ObjectPath, dst: &ObjectPath) -> FsResult<()> {
        self.execute_copies(plan)?;
        self.verify_transfers(plan, src, dst)?;
        self.delete_keys(src, &plan.src_bucket, &plan.source_keys())?;
        Ok(())
    }

    fn verify_transfers(&self, plan: &TransferPlan, src: &ObjectPath, dst: &ObjectPath) -> FsResult<()> {
        let present: HashSet<String> = self
            .store
            .list(&plan.dst_bucket, &plan.verify_prefix)?
            .into_iter()
            .map(|meta| meta.key)
            .collect();
        let missing: Vec<String> = plan
            .transfers
            .iter()
            .filter(|t| !present.contains(&t.dst_key))
            .map(|t| t.dst_key.clone())
            .collect();
        if !missing.is_empty() {
            warn!(src = %src, dst = %dst, missing = missing.len(), "copied objects not visible at destination");
            return Err(FsError::RenameVerification {
                src: src.to_string(),
                dst: dst.to_string(),
                missing,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Local upload
    // -----------------------------------------------------------------------

    /// Upload a local file or directory tree to `dst`.
    ///
    /// If `dst` is an existing directory or bucket the upload lands at
    /// `dst/<local name>`. Local directories become markers, so empty ones
    /// survive. Returns the number of files uploaded.
    pub fn copy_from_local(&self, local: &Path, dst: &str) -> FsResult<usize> {
        let meta = std::fs::metadata(local).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(local.display().to_string()),
            _ => FsError::Io(e),
        })?;
        let dst = self.parse(dst)?;
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FsError::invalid_target(local.display(), &dst, "local path has no file name"))?;

        let target = if dst.is_root() {
            return Err(FsError::invalid_target(local.display(), &dst, "cannot write to the store root"));
        } else if dst.is_bucket_root() || dst.has_trailing_separator() || self.isdir_path(&dst)? {
            dst.child(&name)?
        } else if meta.is_dir() && self.exists_path(&dst)? {
            return Err(FsError::invalid_target(local.display(), &dst, "destination is an existing file"));
        } else {
            dst.clone()
        };

        if meta.is_file() {
            self.upload_file(local, &target)?;
            info!(local = %local.display(), dst = %target, "file uploaded");
            return Ok(1);
        }

        let (bucket, _) = require_key(&target, "upload target needs a key")?;
        let mut files = 0;
        for entry in WalkDir::new(local).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let rel = entry
                .path()
                .strip_prefix(local)
                .map_err(|e| FsError::Io(io::Error::other(e)))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let object = if rel.is_empty() { target.clone() } else { target.child(&rel)? };
            if entry.file_type().is_dir() {
                if let Some(marker) = object.marker_key() {
                    self.store.put_object(bucket, &marker, &[])?;
                }
            } else if entry.file_type().is_file() {
                self.upload_file(entry.path(), &object)?;
                files += 1;
            }
        }
        info!(local = %local.display(), dst = %target, files, "directory uploaded");
        Ok(files)
    }

    fn upload_file(&self, local: &Path, target: &ObjectPath) -> FsResult<u64> {
        let mut file = std::fs::File::open(local)?;
        let mut writer = self.writer_for(target)?;
        io::copy(&mut file, &mut writer)?;
        writer.finish()
    }
}
