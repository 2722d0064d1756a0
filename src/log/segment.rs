//! Log Segment Management
//!
//! Binds one store and one index under a shared base offset and translates
//! absolute offsets into store positions.

use std::path::Path;
use std::sync::Arc;

use super::index::Index;
use super::record::{Offset, Record};
use super::store::{Store, LEN_WIDTH};
use super::LogPaths;
use crate::config::SegmentConfig;
use crate::error::{Error, Result};

/// A single store/index pair
pub struct Segment {
    /// Absolute offset of the first record in this segment
    base_offset: Offset,
    /// Offset the next appended record receives
    next_offset: Offset,
    /// Record file, shared with outstanding log readers
    store: Arc<Store>,
    /// Offset index
    index: Index,
    /// Size limits
    config: SegmentConfig,
}

impl Segment {
    /// Open the segment with `base_offset` in `dir`, creating its files if needed
    pub fn open(dir: &Path, base_offset: Offset, config: &SegmentConfig) -> Result<Self> {
        let paths = LogPaths::new(dir.to_path_buf());
        let store = Store::open(paths.store_path(base_offset), config.fsync)?;
        let index = Index::open(paths.index_path(base_offset), config.max_index_bytes)?;

        let next_offset = match index.read_last() {
            Ok((relative, _)) => base_offset + relative as u64 + 1,
            Err(Error::EndOfFile) => base_offset,
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "Opened segment {} (next offset {}, store {} bytes, index {} bytes)",
            base_offset,
            next_offset,
            store.size(),
            index.size()
        );

        Ok(Self {
            base_offset,
            next_offset,
            store: Arc::new(store),
            index,
            config: config.clone(),
        })
    }

    /// Stamp the record with the next offset and append it
    pub fn append(&mut self, record: Record) -> Result<Offset> {
        let cur = self.next_offset;
        let relative = u32::try_from(cur - self.base_offset).map_err(|_| Error::EndOfFile)?;

        let data = record.with_offset(cur).encode()?;
        if LEN_WIDTH + data.len() as u64 > self.config.max_store_bytes {
            tracing::warn!(
                "Record at offset {} ({} bytes) exceeds max_store_bytes ({})",
                cur,
                data.len(),
                self.config.max_store_bytes
            );
        }

        let (_, pos) = self.store.append(&data)?;
        if let Err(e) = self.index.write(relative, pos) {
            // Drop the store record so it cannot surface as an orphan
            tracing::warn!(
                "Index write failed for offset {} in segment {}, rolling back store: {}",
                cur,
                self.base_offset,
                e
            );
            self.store.truncate(pos)?;
            return Err(e);
        }

        self.next_offset += 1;
        Ok(cur)
    }

    /// Read the record at absolute `offset`
    pub fn read(&self, offset: Offset) -> Result<Record> {
        if offset < self.base_offset || offset >= self.next_offset {
            return Err(Error::OutOfRange(offset));
        }
        let (_, pos) = self.index.read((offset - self.base_offset) as u32)?;
        let data = self.store.read(pos)?;
        Record::decode(&data)
    }

    /// Whether either file reached its configured maximum
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    /// Close the index, then the store
    pub fn close(&mut self) -> Result<()> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Close the segment and delete both files
    pub fn remove(mut self) -> Result<()> {
        self.close()?;
        std::fs::remove_file(self.index.name())?;
        std::fs::remove_file(self.store.name())?;
        tracing::debug!("Removed segment {}", self.base_offset);
        Ok(())
    }

    /// Flush buffered store writes
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn base_offset(&self) -> Offset {
        self.base_offset
    }

    pub fn next_offset(&self) -> Offset {
        self.next_offset
    }

    /// Shared handle to the store, for whole-log readers
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Snapshot of this segment for status reporting
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            base_offset: self.base_offset,
            next_offset: self.next_offset,
            store_bytes: self.store.size(),
            index_bytes: self.index.size(),
        }
    }
}

/// Information about a log segment
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SegmentInfo {
    pub base_offset: Offset,
    pub next_offset: Offset,
    pub store_bytes: u64,
    pub index_bytes: u64,
}
