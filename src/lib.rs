//! WolfLog - Segmented Commit Log
//!
//! An append-only, offset-addressed commit log. Producers append opaque
//! records and consumers read them back by their 64-bit offset.
//!
//! # Architecture
//!
//! Records are partitioned into size-bounded segments on disk. Each segment
//! is a store file of length-prefixed records plus a memory-mapped index
//! from relative offset to store position. The log owns the segments,
//! appends to the last one, and rolls over to a new segment once it is full.
//!
//! # Features
//!
//! - Dense, monotonic offsets that survive restarts
//! - O(1) offset lookup through a memory-mapped index
//! - Many concurrent readers with a single serialized appender
//! - Prefix truncation of whole segments to reclaim space
//! - Raw byte reader over every store file
//! - HTTP API for produce and consume

pub mod config;
pub mod error;
pub mod log;
pub mod api;

pub use config::WolfLogConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{LogConfig, SegmentConfig, WolfLogConfig};
    pub use crate::error::{Error, Result};
    pub use crate::log::{Log, LogReader, Offset, Record};
}
