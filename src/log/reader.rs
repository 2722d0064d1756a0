//! Whole-Log Reader
//!
//! Streams the raw bytes of every store file in segment order, length
//! prefixes included.

use std::io::{self, Read};
use std::marker::PhantomData;
use std::sync::Arc;

use super::commit_log::Log;
use super::store::Store;
use crate::error::Error;

/// Concatenated reader over all store files of a log
pub struct LogReader<'a> {
    /// Stores in base offset order
    stores: Vec<Arc<Store>>,
    /// Store currently being read
    current: usize,
    /// Byte position within the current store
    pos: u64,
    _log: PhantomData<&'a Log>,
}

impl<'a> LogReader<'a> {
    pub(super) fn new(stores: Vec<Arc<Store>>) -> Self {
        Self {
            stores,
            current: 0,
            pos: 0,
            _log: PhantomData,
        }
    }
}

impl Read for LogReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(store) = self.stores.get(self.current) {
            let n = store.read_at(buf, self.pos).map_err(into_io_error)?;
            if n > 0 {
                self.pos += n as u64;
                return Ok(n);
            }

            // Current store exhausted, move to next
            self.current += 1;
            self.pos = 0;
        }

        Ok(0)
    }
}

fn into_io_error(e: Error) -> io::Error {
    match e {
        Error::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}
