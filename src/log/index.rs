//! Log Index
//!
//! Fixed-width table mapping a segment-relative offset to the position of
//! the record in the store. The file is grown to its maximum size and
//! memory-mapped while open, then shrunk back to the written entries on
//! close so a restart can recover the entry count from the file size.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;

use crate::error::{Error, Result};

/// Width of the relative offset field
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field
pub const POSITION_WIDTH: u64 = 8;
/// Width of a whole index entry
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Memory-mapped offset index
pub struct Index {
    /// File path
    path: PathBuf,
    /// File handle, `None` once closed
    file: Option<File>,
    /// Mapping over the whole (grown) file, `None` once closed
    mmap: Option<MmapMut>,
    /// Bytes of valid entries
    size: u64,
}

impl Index {
    /// Open (or create) an index file at `path`
    pub fn open(path: impl Into<PathBuf>, max_index_bytes: u64) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Self::new(file, path, max_index_bytes)
    }

    /// Wrap an opened file, growing it to `max_index_bytes` and mapping it
    pub fn new(file: File, path: PathBuf, max_index_bytes: u64) -> Result<Self> {
        let mut size = file.metadata()?.len();
        if size % ENTRY_WIDTH != 0 {
            tracing::warn!(
                "Index {:?} has a partial trailing entry ({} bytes), ignoring it",
                path,
                size % ENTRY_WIDTH
            );
            size -= size % ENTRY_WIDTH;
        }

        // Never shrink below entries already written
        file.set_len(max_index_bytes.max(size))?;

        // SAFETY: the file is opened read/write and owned by this index for
        // the whole lifetime of the mapping; the mapping is dropped before
        // the file is truncated or closed.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            path,
            file: Some(file),
            mmap: Some(mmap),
            size,
        })
    }

    /// Append an entry. Fails with `EndOfFile` once the mapping is full.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> Result<()> {
        let size = self.size;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| Error::ClosedFile(self.path.display().to_string()))?;

        if (mmap.len() as u64) < size + ENTRY_WIDTH {
            return Err(Error::EndOfFile);
        }

        let start = size as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;
        BigEndian::write_u32(&mut mmap[start..mid], relative_offset);
        BigEndian::write_u64(&mut mmap[mid..end], position);

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Read the entry in `slot`, returning `(relative_offset, position)`
    pub fn read(&self, slot: u32) -> Result<(u32, u64)> {
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| Error::ClosedFile(self.path.display().to_string()))?;

        if self.size == 0 {
            return Err(Error::EndOfFile);
        }

        let start = slot as u64 * ENTRY_WIDTH;
        if start + ENTRY_WIDTH > self.size {
            return Err(Error::EndOfFile);
        }

        let start = start as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;
        Ok((
            BigEndian::read_u32(&mmap[start..mid]),
            BigEndian::read_u64(&mmap[mid..end]),
        ))
    }

    /// Read the last written entry
    pub fn read_last(&self) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfFile);
        }
        self.read((self.size / ENTRY_WIDTH - 1) as u32)
    }

    /// Flush and unmap, then sync and shrink the file to the written entries.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mmap) = self.mmap.take() {
            mmap.flush()?;
        }
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            file.set_len(self.size)?;
            tracing::debug!("Closed index {:?} at {} bytes", self.path, self.size);
        }
        Ok(())
    }

    /// Index file path
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Bytes of valid entries
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of entries written
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                tracing::error!("Failed to close index {:?}: {}", self.path, e);
            }
        }
    }
}
