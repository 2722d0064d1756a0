//! Log Store
//!
//! Append-only record file. Each record is framed as an 8-byte big-endian
//! length followed by the payload. Writes go through a user-space buffer
//! which is flushed before every read.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};

/// Width of the record length prefix in bytes
pub const LEN_WIDTH: u64 = 8;

/// Length-framed record file
pub struct Store {
    /// File path
    path: PathBuf,
    /// Buffered writer, `None` once closed
    inner: Mutex<Option<BufWriter<File>>>,
    /// Logical size including buffered bytes
    size: AtomicU64,
    /// Sync the file after every append
    fsync: bool,
}

impl Store {
    /// Open (or create) a store file at `path`
    pub fn open(path: impl Into<PathBuf>, fsync: bool) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;
        Self::new(file, path, fsync)
    }

    /// Wrap an already opened file. The size on disk is trusted as-is.
    pub fn new(file: File, path: PathBuf, fsync: bool) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            inner: Mutex::new(Some(BufWriter::new(file))),
            size: AtomicU64::new(size),
            fsync,
        })
    }

    /// Append a record, returning `(bytes_written, position)`
    pub fn append(&self, data: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock()?;
        let writer = self.writer(&mut inner)?;

        let pos = self.size.load(Ordering::Acquire);
        if let Err(e) = self.write_frame(writer, data) {
            self.discard_from(&mut inner, pos);
            return Err(e);
        }

        let written = LEN_WIDTH + data.len() as u64;
        self.size.store(pos + written, Ordering::Release);
        Ok((written, pos))
    }

    /// Read the record whose length prefix starts at `pos`
    pub fn read(&self, pos: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock()?;
        let writer = self.writer(&mut inner)?;
        writer.flush()?;

        let size = self.size.load(Ordering::Acquire);
        if pos.checked_add(LEN_WIDTH).map_or(true, |end| end > size) {
            return Err(self.corrupt(format!(
                "position {} is past end of store ({} bytes)",
                pos, size
            )));
        }

        let file = writer.get_ref();
        let mut len_bytes = [0u8; LEN_WIDTH as usize];
        file.read_exact_at(&mut len_bytes, pos)?;
        let len = BigEndian::read_u64(&len_bytes);

        let end = (pos + LEN_WIDTH).checked_add(len).filter(|end| *end <= size);
        if end.is_none() {
            return Err(self.corrupt(format!(
                "record at {} claims {} bytes, store is {} bytes",
                pos, len, size
            )));
        }

        let mut data = vec![0u8; len as usize];
        file.read_exact_at(&mut data, pos + LEN_WIDTH)?;
        Ok(data)
    }

    /// Raw positional read into `buf`, returning the number of bytes read
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock()?;
        let writer = self.writer(&mut inner)?;
        writer.flush()?;
        Ok(writer.get_ref().read_at(buf, offset)?)
    }

    /// Cut the store back to `size` bytes, discarding everything after it
    pub fn truncate(&self, size: u64) -> Result<()> {
        let mut inner = self.inner.lock()?;
        let writer = self.writer(&mut inner)?;
        writer.flush()?;
        writer.get_ref().set_len(size)?;
        self.size.store(size, Ordering::Release);
        Ok(())
    }

    /// Flush buffered writes to the file
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        let writer = self.writer(&mut inner)?;
        writer.flush()?;
        Ok(())
    }

    /// Flush and close the file. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        if let Some(mut writer) = inner.take() {
            writer.flush()?;
            tracing::debug!("Closed store {:?}", self.path);
        }
        Ok(())
    }

    /// Store file path
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes, including buffered writes
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Get the writer, probing the file handle first
    fn writer<'a>(
        &self,
        inner: &'a mut Option<BufWriter<File>>,
    ) -> Result<&'a mut BufWriter<File>> {
        let writer = inner
            .as_mut()
            .ok_or_else(|| Error::ClosedFile(self.path.display().to_string()))?;
        writer
            .get_ref()
            .metadata()
            .map_err(|_| Error::ClosedFile(self.path.display().to_string()))?;
        Ok(writer)
    }

    fn write_frame(&self, writer: &mut BufWriter<File>, data: &[u8]) -> Result<()> {
        writer.write_u64::<BigEndian>(data.len() as u64)?;
        writer.write_all(data)?;

        if self.fsync {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Drop buffered bytes of a failed append and cut the file back to `pos`
    fn discard_from(&self, inner: &mut Option<BufWriter<File>>, pos: u64) {
        if let Some(writer) = inner.take() {
            let (file, _) = writer.into_parts();
            if let Err(e) = file.set_len(pos) {
                tracing::warn!("Failed to roll back store {:?} to {}: {}", self.path, pos, e);
            }
            *inner = Some(BufWriter::new(file));
        }
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::Corrupt {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut writer) = inner.take() {
            if let Err(e) = writer.flush() {
                tracing::error!("Failed to close store {:?}: {}", self.path, e);
            }
        }
    }
}
