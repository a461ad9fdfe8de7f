//! Chunked writes and cursor-based reads.
//!
//! Writes are buffered up to the configured chunk size. Content that fits a
//! single chunk goes out as one PUT; anything larger becomes a multipart
//! upload with one part per chunk. A multipart upload that does not finish
//! is aborted so no orphaned parts are left in the store.

use std::io::{self, SeekFrom};

use bucketfs_store::{MultipartUpload, ObjectStore};
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::fs::{absent_if_no_bucket, require_key, BucketFs};
use crate::uri::ObjectPath;

/// Default size of each uploaded chunk: 128 MiB.
pub const DEFAULT_WRITE_SIZE: usize = 128 * 1024 * 1024;

/// Modes accepted by [`BucketFs::open`].
pub const READ_MODES: [&str; 2] = ["r", "rb"];

/// Streaming writer for one object.
///
/// Obtained from [`BucketFs::upload_writer`]. Call [`finish`](Self::finish)
/// to commit; dropping the writer without finishing aborts any multipart
/// upload in progress and writes nothing.
pub struct UploadWriter<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    key: String,
    chunk_size: usize,
    buffer: Vec<u8>,
    upload: Option<MultipartUpload>,
    next_part: u32,
    written: u64,
    done: bool,
}

impl<'a> UploadWriter<'a> {
    fn new(store: &'a dyn ObjectStore, bucket: &str, key: &str, chunk_size: usize) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            chunk_size,
            buffer: Vec::new(),
            upload: None,
            next_part: 1,
            written: 0,
            done: false,
        }
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Buffer `data`, uploading a part each time more than one chunk is
    /// pending.
    ///
    /// The last chunk is always held back for [`finish`](Self::finish), so
    /// content of exactly one chunk is still a single PUT. Whole chunks are
    /// sent straight from `data`; the buffer never holds more than one.
    pub fn push(&mut self, data: &[u8]) -> FsResult<()> {
        if self.done {
            return Err(FsError::invalid_operation(self.location(), "upload already finished"));
        }
        self.written += data.len() as u64;
        if self.buffer.len() + data.len() <= self.chunk_size {
            self.buffer.extend_from_slice(data);
            return Ok(());
        }
        let (head, mut rest) = data.split_at(self.chunk_size - self.buffer.len());
        self.buffer.extend_from_slice(head);
        let full = std::mem::take(&mut self.buffer);
        if let Err(e) = self.send_part(&full) {
            self.abort();
            return Err(e);
        }
        while rest.len() > self.chunk_size {
            let (part, tail) = rest.split_at(self.chunk_size);
            if let Err(e) = self.send_part(part) {
                self.abort();
                return Err(e);
            }
            rest = tail;
        }
        self.buffer.extend_from_slice(rest);
        Ok(())
    }

    /// Commit the object. Returns the number of bytes written.
    pub fn finish(mut self) -> FsResult<u64> {
        if self.done {
            return Err(FsError::invalid_operation(self.location(), "upload already finished"));
        }
        let rest = std::mem::take(&mut self.buffer);
        let result = match self.upload.clone() {
            None => self
                .store
                .put_object(&self.bucket, &self.key, &rest)
                .map_err(FsError::from),
            Some(upload) => self.send_part(&rest).and_then(|()| {
                self.store
                    .complete_multipart_upload(&upload)
                    .map_err(FsError::from)
            }),
        };
        match result {
            Ok(()) => {
                self.done = true;
                debug!(
                    bucket = %self.bucket,
                    key = %self.key,
                    bytes = self.written,
                    parts = self.next_part - 1,
                    "upload finished"
                );
                Ok(self.written)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn send_part(&mut self, data: &[u8]) -> FsResult<()> {
        let upload = match &self.upload {
            Some(upload) => upload.clone(),
            None => {
                let upload = self.store.create_multipart_upload(&self.bucket, &self.key)?;
                debug!(bucket = %self.bucket, key = %self.key, upload_id = %upload.upload_id, "multipart upload started");
                self.upload = Some(upload.clone());
                upload
            }
        };
        self.store.upload_part(&upload, self.next_part, data)?;
        self.next_part += 1;
        Ok(())
    }

    fn abort(&mut self) {
        self.done = true;
        self.buffer.clear();
        if let Some(upload) = self.upload.take() {
            if let Err(e) = self.store.abort_multipart_upload(&upload) {
                warn!(upload_id = %upload.upload_id, error = %e, "failed to abort multipart upload");
            }
        }
    }

    fn location(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

impl io::Write for UploadWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UploadWriter<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.abort();
        }
    }
}

impl std::fmt::Debug for UploadWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadWriter")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("written", &self.written)
            .field("parts", &(self.next_part - 1))
            .finish()
    }
}

/// Read handle with its own cursor.
///
/// Every read is a ranged GET against the store; handles share nothing.
pub struct ObjectReader<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    key: String,
    size: u64,
    pos: u64,
}

impl ObjectReader<'_> {
    /// Read up to `n` bytes from the cursor, or everything left for `None`.
    /// Returns an empty buffer at end of object.
    pub fn read(&mut self, n: Option<u64>) -> FsResult<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.pos);
        let length = n.map_or(remaining, |n| n.min(remaining));
        if length == 0 {
            return Ok(Vec::new());
        }
        let data = absent_if_no_bucket(self.store.get_range(&self.bucket, &self.key, self.pos, length))?
            .ok_or_else(|| FsError::NotFound(format!("{}/{}", self.bucket, self.key)))?;
        self.pos += data.len() as u64;
        Ok(data)
    }

    /// Current cursor position.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Object size when the handle was opened.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl io::Read for ObjectReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = ObjectReader::read(self, Some(buf.len() as u64)).map_err(io::Error::other)?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Seek for ObjectReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        self.pos = target;
        Ok(target)
    }
}

impl std::fmt::Debug for ObjectReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("size", &self.size)
            .field("pos", &self.pos)
            .finish()
    }
}

impl BucketFs {
    /// Start a streaming upload to `path`.
    pub fn upload_writer(&self, path: &str) -> FsResult<UploadWriter<'_>> {
        let path = self.parse(path)?;
        self.writer_for(&path)
    }

    pub(crate) fn writer_for(&self, path: &ObjectPath) -> FsResult<UploadWriter<'_>> {
        let (bucket, key) = require_key(path, "objects can only be written below a bucket")?;
        if path.has_trailing_separator() {
            return Err(FsError::invalid_operation(path, "cannot write an object at a directory path"));
        }
        Ok(UploadWriter::new(
            self.store.as_ref(),
            bucket,
            key,
            self.config.write_chunk_size,
        ))
    }

    /// Write `data` to `path`, replacing any existing object.
    pub fn create(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let mut writer = self.upload_writer(path)?;
        writer.push(data)?;
        writer.finish()?;
        Ok(())
    }

    /// Open an existing object for reading. `mode` must be `"r"` or `"rb"`.
    pub fn open(&self, path: &str, mode: &str) -> FsResult<ObjectReader<'_>> {
        if !READ_MODES.contains(&mode) {
            return Err(FsError::InvalidMode(mode.to_string()));
        }
        let path = self.parse(path)?;
        let (bucket, key) = require_key(&path, "only objects can be opened")?;
        let meta = absent_if_no_bucket(self.store.head_object(bucket, key))?
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        Ok(ObjectReader {
            store: self.store.as_ref(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: meta.size,
            pos: 0,
        })
    }

    /// Read `length` bytes at `offset`, clipped at the end of the object.
    pub fn read(&self, path: &str, offset: u64, length: u64) -> FsResult<Vec<u8>> {
        let path = self.parse(path)?;
        let (bucket, key) = require_key(&path, "only objects can be read")?;
        absent_if_no_bucket(self.store.get_range(bucket, key, offset, length))?
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, Write};

    use super::*;
    use crate::config::FsConfig;
    use crate::fs::testing::*;
    use bucketfs_store::StoreCall;
    use proptest::prelude::*;

    fn small_chunks(size: usize) -> (std::sync::Arc<bucketfs_store::InMemoryObjectStore>, BucketFs) {
        fixture_with(FsConfig::default().with_write_chunk_size(size))
    }

    // -----------------------------------------------------------------------
    // create / UploadWriter
    // -----------------------------------------------------------------------

    #[test]
    fn small_content_is_a_single_put() {
        let (store, fs) = small_chunks(4);
        fs.create(&path("small"), b"abcd").unwrap();
        assert_eq!(
            store.calls(),
            vec![StoreCall::Put { bucket: BUCKET.into(), key: "small".into(), size: 4 }]
        );
        assert_eq!(fs.read(&path("small"), 0, 4).unwrap(), b"abcd");
    }

    #[test]
    fn large_content_uses_one_part_per_chunk() {
        let (store, fs) = small_chunks(4);
        fs.create(&path("large"), b"0123456789").unwrap();

        let sizes: Vec<u64> = store
            .calls()
            .iter()
            .filter_map(|c| match c {
                StoreCall::UploadPart { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(matches!(store.calls()[0], StoreCall::CreateMultipartUpload { .. }));
        assert!(matches!(store.calls().last(), Some(StoreCall::CompleteMultipartUpload { .. })));
        assert_eq!(store.pending_uploads(), 0);
        assert_eq!(fs.read(&path("large"), 0, 100).unwrap(), b"0123456789");
    }

    #[test]
    fn uneven_pushes_send_whole_chunks_and_hold_one_back() {
        let (store, fs) = small_chunks(4);
        let mut writer = fs.upload_writer(&path("uneven")).unwrap();
        for data in [&b"ab"[..], b"cdefghijklmno", b"p", b"qrst"] {
            writer.push(data).unwrap();
            assert!(writer.buffer.len() <= 4);
        }
        assert_eq!(writer.finish().unwrap(), 20);

        let sizes: Vec<u64> = store
            .calls()
            .iter()
            .filter_map(|c| match c {
                StoreCall::UploadPart { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![4, 4, 4, 4, 4]);
        assert_eq!(fs.read(&path("uneven"), 0, 20).unwrap(), b"abcdefghijklmnopqrst");
    }

    #[test]
    fn create_overwrites() {
        let (_store, fs) = fixture();
        fs.create(&path("f"), b"first").unwrap();
        fs.create(&path("f"), b"2nd").unwrap();
        assert_eq!(fs.read(&path("f"), 0, 10).unwrap(), b"2nd");
    }

    #[test]
    fn create_rejects_non_object_paths() {
        let (_store, fs) = fixture();
        for p in ["s3a://", "s3a://gethue", "s3a://gethue/dir/"] {
            assert!(
                matches!(fs.create(p, b"x"), Err(FsError::InvalidOperation { .. })),
                "{p}"
            );
        }
    }

    #[test]
    fn failed_part_aborts_upload() {
        let (store, fs) = small_chunks(2);
        store.fail_write_to("broken");
        assert!(fs.create(&path("broken"), b"abcdef").is_err());
        assert_eq!(store.pending_uploads(), 0);
        assert!(store.calls().iter().any(|c| matches!(c, StoreCall::AbortMultipartUpload { .. })));
        assert!(!fs.exists(&path("broken")).unwrap());
    }

    #[test]
    fn dropped_writer_aborts() {
        let (store, fs) = small_chunks(2);
        {
            let mut writer = fs.upload_writer(&path("partial")).unwrap();
            writer.write_all(b"abcdef").unwrap();
            assert_eq!(store.pending_uploads(), 1);
        }
        assert_eq!(store.pending_uploads(), 0);
        assert!(!fs.exists(&path("partial")).unwrap());
    }

    #[test]
    fn writer_streams_through_io_write() {
        let (_store, fs) = small_chunks(3);
        let mut writer = fs.upload_writer(&path("streamed")).unwrap();
        for chunk in [&b"ab"[..], b"cde", b"f", b"ghij"] {
            writer.write_all(chunk).unwrap();
        }
        writer.flush().unwrap();
        assert_eq!(writer.written(), 10);
        assert_eq!(writer.finish().unwrap(), 10);
        assert_eq!(fs.read(&path("streamed"), 0, 10).unwrap(), b"abcdefghij");
    }

    #[test]
    fn empty_object() {
        let (store, fs) = fixture();
        fs.create(&path("empty"), b"").unwrap();
        assert_eq!(store.head_object(BUCKET, "empty").unwrap().unwrap().size, 0);
        assert!(fs.isfile(&path("empty")).unwrap());
    }

    proptest! {
        #[test]
        fn chunked_create_then_read(
            data in proptest::collection::vec(any::<u8>(), 0..200),
            chunk in 1usize..32,
        ) {
            let (store, fs) = small_chunks(chunk);
            fs.create(&path("blob"), &data).unwrap();
            prop_assert_eq!(fs.read(&path("blob"), 0, data.len() as u64).unwrap(), data);
            prop_assert_eq!(store.pending_uploads(), 0);
        }
    }

    // -----------------------------------------------------------------------
    // open / read
    // -----------------------------------------------------------------------

    #[test]
    fn open_handles_are_independent() {
        let (store, fs) = fixture();
        seed(&store, &[("test_open", "Hello world!")]);

        let mut a = fs.open(&path("test_open"), "r").unwrap();
        let mut b = fs.open(&path("test_open"), "rb").unwrap();
        assert_eq!(a.read(Some(5)).unwrap(), b"Hello");
        assert_eq!(a.tell(), 5);
        assert_eq!(b.tell(), 0);
        assert_eq!(b.read(None).unwrap(), b"Hello world!");
        assert_eq!(a.read(None).unwrap(), b" world!");
        assert!(a.read(Some(1)).unwrap().is_empty());
    }

    #[test]
    fn open_rejects_write_modes() {
        let (store, fs) = fixture();
        seed(&store, &[("test_open", "x")]);
        for mode in ["w", "?r", "a", ""] {
            assert!(matches!(fs.open(&path("test_open"), mode), Err(FsError::InvalidMode(_))));
        }
    }

    #[test]
    fn open_missing_object() {
        let (_store, fs) = fixture();
        assert!(matches!(fs.open(&path("nope"), "r"), Err(FsError::NotFound(_))));
        assert!(matches!(fs.open("s3a://no-bucket/k", "r"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn reader_implements_read_and_seek() {
        let (store, fs) = fixture();
        seed(&store, &[("seekable", "0123456789")]);
        let mut reader = fs.open(&path("seekable"), "r").unwrap();

        assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 7);
        let mut tail = String::new();
        reader.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "789");

        reader.seek(SeekFrom::Start(2)).unwrap();
        reader.seek(SeekFrom::Current(1)).unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"3456");
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
        assert_eq!(reader.size(), 10);
    }

    #[test]
    fn read_clips_range() {
        let (store, fs) = fixture();
        seed(&store, &[("r", "abcdef")]);
        assert_eq!(fs.read(&path("r"), 2, 3).unwrap(), b"cde");
        assert_eq!(fs.read(&path("r"), 4, 100).unwrap(), b"ef");
        assert!(fs.read(&path("r"), 10, 5).unwrap().is_empty());
        assert!(matches!(fs.read(&path("missing"), 0, 1), Err(FsError::NotFound(_))));
    }
}
