//! Log Record Types
//!
//! Defines the record value that producers append and consumers read back.
//! The storage engine only ever sees the encoded form; the offset field is
//! stamped by the segment immediately before encoding.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Absolute offset - unique, dense identifier of a record in the log
pub type Offset = u64;

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload supplied by the producer
    pub value: Vec<u8>,
    /// Absolute offset assigned at append time
    #[serde(default)]
    pub offset: Offset,
}

impl Record {
    /// Create a record with an unassigned offset
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }

    /// Return the record stamped with `offset`
    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    /// Serialize to the on-disk payload form
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the on-disk payload form
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Size of the encoded payload in bytes
    pub fn encoded_len(&self) -> Result<u64> {
        Ok(bincode::serialized_size(self)?)
    }
}
