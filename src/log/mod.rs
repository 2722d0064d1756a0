//! Commit Log Module
//!
//! Append-only, offset-addressed log split into size-bounded segments.
//! Each segment is a store file of length-prefixed records plus a
//! memory-mapped index from relative offset to store position.

pub mod record;
mod store;
mod index;
mod segment;
mod commit_log;
mod reader;

pub use record::{Offset, Record};
pub use store::{Store, LEN_WIDTH};
pub use index::{Index, ENTRY_WIDTH};
pub use segment::{Segment, SegmentInfo};
pub use commit_log::Log;
pub use reader::LogReader;

use std::path::PathBuf;

/// Extension of segment store files
const STORE_EXT: &str = "store";
/// Extension of segment index files
const INDEX_EXT: &str = "index";

/// Log directory structure
pub struct LogPaths {
    pub base_dir: PathBuf,
}

impl LogPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get path for a segment's store file
    pub fn store_path(&self, base_offset: Offset) -> PathBuf {
        self.base_dir.join(format!("{}.{}", base_offset, STORE_EXT))
    }

    /// Get path for a segment's index file
    pub fn index_path(&self, base_offset: Offset) -> PathBuf {
        self.base_dir.join(format!("{}.{}", base_offset, INDEX_EXT))
    }

    /// Ensure log directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)
    }

    /// Base offsets of all segment files in the directory, sorted and deduplicated
    pub fn base_offsets(&self) -> std::io::Result<Vec<Offset>> {
        let mut offsets = Vec::new();

        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();

            let is_segment_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext == STORE_EXT || ext == INDEX_EXT);
            let base_offset = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<Offset>().ok());

            match base_offset {
                Some(offset) if is_segment_file => offsets.push(offset),
                _ => tracing::warn!("Ignoring unexpected file in log directory: {:?}", path),
            }
        }

        // Store and index share a base offset
        offsets.sort_unstable();
        offsets.dedup();
        Ok(offsets)
    }
}
