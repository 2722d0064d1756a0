//! Commit Log
//!
//! Owns every segment in a directory. Appends go to the last (active)
//! segment, which is rolled over once full; reads are routed to the segment
//! covering the requested offset.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::reader::LogReader;
use super::record::{Offset, Record};
use super::segment::{Segment, SegmentInfo};
use super::LogPaths;
use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Segmented, offset-addressed commit log
pub struct Log {
    /// Directory holding the segment files
    dir: PathBuf,
    /// Configuration
    config: LogConfig,
    /// Segments ordered by base offset; the last one is active
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Open the log in `dir`, loading any segments already on disk
    pub fn new(dir: impl Into<PathBuf>, config: LogConfig) -> Result<Self> {
        let dir = dir.into();
        let config = config.with_defaults();
        config.validate()?;

        LogPaths::new(dir.clone()).ensure_dirs()?;
        let segments = Self::setup(&dir, &config)?;

        let log = Self {
            dir,
            config,
            segments: RwLock::new(segments),
        };
        tracing::info!(
            "Opened log at {:?} with offsets {}..={}",
            log.dir,
            log.lowest_offset()?,
            log.highest_offset()?
        );
        Ok(log)
    }

    /// Load segments from disk, or create the initial one
    fn setup(dir: &Path, config: &LogConfig) -> Result<Vec<Segment>> {
        let base_offsets = LogPaths::new(dir.to_path_buf()).base_offsets()?;

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Segment::open(dir, base_offset, &config.segment)?);
        }

        if segments.is_empty() {
            segments.push(Segment::open(
                dir,
                config.segment.initial_offset,
                &config.segment,
            )?);
        }

        Ok(segments)
    }

    /// Append a record, returning its assigned offset
    pub fn append(&self, record: Record) -> Result<Offset> {
        let mut segments = self.segments.write()?;

        // A full active segment survives a reopen with smaller limits or an
        // earlier failed rollover; move past it before writing.
        if segments.last().map_or(true, Segment::is_maxed) {
            self.roll_over(&mut segments)?;
        }

        let active = segments
            .last_mut()
            .ok_or_else(|| Error::Internal("Log has no active segment".into()))?;
        let offset = active.append(record)?;

        // The record is durable at this point, so a failed rollover must not
        // hide its offset. The next append retries it.
        if active.is_maxed() {
            if let Err(e) = self.roll_over(&mut segments) {
                tracing::warn!("Failed to roll over after offset {}: {}", offset, e);
            }
        }

        Ok(offset)
    }

    /// Open a new active segment starting at the current next offset
    fn roll_over(&self, segments: &mut Vec<Segment>) -> Result<()> {
        let next_offset = segments
            .last()
            .map(|s| s.next_offset())
            .unwrap_or(self.config.segment.initial_offset);
        if let Some(active) = segments.last() {
            tracing::debug!(
                "Segment {} is full, rolling over to {}",
                active.base_offset(),
                next_offset
            );
        }
        let segment = Segment::open(&self.dir, next_offset, &self.config.segment)?;
        segments.push(segment);
        Ok(())
    }

    /// Read the record at `offset`
    pub fn read(&self, offset: Offset) -> Result<Record> {
        let segments = self.segments.read()?;

        // Last segment whose base offset is <= offset
        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        let segment = match idx.checked_sub(1).map(|i| &segments[i]) {
            Some(segment) if offset < segment.next_offset() => segment,
            _ => return Err(Error::OutOfRange(offset)),
        };

        segment.read(offset)
    }

    /// Smallest offset still held by the log
    pub fn lowest_offset(&self) -> Result<Offset> {
        let segments = self.segments.read()?;
        segments
            .first()
            .map(|s| s.base_offset())
            .ok_or_else(|| Error::Internal("Log has no segments".into()))
    }

    /// Largest offset appended so far
    pub fn highest_offset(&self) -> Result<Offset> {
        let segments = self.segments.read()?;
        let next_offset = segments
            .last()
            .map(|s| s.next_offset())
            .ok_or_else(|| Error::Internal("Log has no segments".into()))?;
        Ok(next_offset.saturating_sub(1))
    }

    /// Remove every segment whose highest offset is <= `lowest`
    pub fn truncate(&self, lowest: Offset) -> Result<()> {
        let mut segments = self.segments.write()?;
        let next_offset = segments
            .last()
            .map(|s| s.next_offset())
            .unwrap_or(self.config.segment.initial_offset);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *segments)
            .into_iter()
            .partition(|s| s.next_offset() <= lowest.saturating_add(1));
        *segments = kept;

        let count = removed.len();
        let removal = removed.into_iter().try_for_each(Segment::remove);

        // Keep an active segment so offsets stay monotonic. Opened after the
        // removals, since an empty active segment shares this base offset.
        if segments.is_empty() {
            segments.push(Segment::open(&self.dir, next_offset, &self.config.segment)?);
        }
        removal?;

        tracing::info!(
            "Truncated log through offset {}: removed {} segment(s)",
            lowest,
            count
        );
        Ok(())
    }

    /// Reader over the raw bytes of every store file, in offset order
    pub fn reader(&self) -> Result<LogReader<'_>> {
        let segments = self.segments.read()?;
        Ok(LogReader::new(segments.iter().map(Segment::store).collect()))
    }

    /// Flush buffered writes of every segment
    pub fn flush(&self) -> Result<()> {
        let segments = self.segments.read()?;
        for segment in segments.iter() {
            segment.flush()?;
        }
        Ok(())
    }

    /// Close every segment
    pub fn close(&self) -> Result<()> {
        let mut segments = self.segments.write()?;
        Self::close_segments(&mut segments)?;
        tracing::info!("Closed log at {:?}", self.dir);
        Ok(())
    }

    /// Close the log and delete its directory
    pub fn remove(&self) -> Result<()> {
        let mut segments = self.segments.write()?;
        Self::close_segments(&mut segments)?;
        std::fs::remove_dir_all(&self.dir)?;
        tracing::info!("Removed log at {:?}", self.dir);
        Ok(())
    }

    /// Remove the log and set it up again empty
    pub fn reset(&self) -> Result<()> {
        let mut segments = self.segments.write()?;
        Self::close_segments(&mut segments)?;
        std::fs::remove_dir_all(&self.dir)?;

        LogPaths::new(self.dir.clone()).ensure_dirs()?;
        *segments = Self::setup(&self.dir, &self.config)?;
        tracing::info!("Reset log at {:?}", self.dir);
        Ok(())
    }

    fn close_segments(segments: &mut [Segment]) -> Result<()> {
        for segment in segments.iter_mut() {
            segment.close()?;
        }
        Ok(())
    }

    /// Number of segments currently held
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.segments.read()?.len())
    }

    /// Snapshot of every segment
    pub fn segments_info(&self) -> Result<Vec<SegmentInfo>> {
        Ok(self.segments.read()?.iter().map(Segment::info).collect())
    }

    /// Log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Effective configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::log::{ENTRY_WIDTH, LEN_WIDTH};
    use byteorder::{BigEndian, ByteOrder};
    use rand::Rng;
    use std::io::Read;
    use tempfile::tempdir;

    fn test_config(max_store_bytes: u64, max_index_bytes: u64) -> LogConfig {
        LogConfig {
            segment: SegmentConfig {
                max_store_bytes,
                max_index_bytes,
                initial_offset: 0,
                fsync: false,
            },
        }
    }

    #[test]
    fn test_append_read() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();

        let offset = log.append(Record::new("hello world")).unwrap();
        assert_eq!(offset, 0);

        let record = log.read(offset).unwrap();
        assert_eq!(record.value, b"hello world");
        assert_eq!(record.offset, 0);
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 0);

        let offset = log.append(Record::new("hello again")).unwrap();
        assert_eq!(offset, 1);
        assert_eq!(log.read(offset).unwrap().value, b"hello again");
    }

    #[test]
    fn test_empty_log_out_of_range() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();

        for offset in [0, 1, 2, u64::MAX] {
            assert!(log.read(offset).unwrap_err().is_not_found());
        }
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 0);
    }

    #[test]
    fn test_out_of_range() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();
        log.append(Record::new("hello world")).unwrap();

        assert!(matches!(log.read(1), Err(Error::OutOfRange(1))));
        assert!(matches!(log.read(2), Err(Error::OutOfRange(2))));
    }

    #[test]
    fn test_initial_offset() {
        let dir = tempdir().unwrap();
        let mut config = test_config(1024, 1024);
        config.segment.initial_offset = 16;
        let log = Log::new(dir.path(), config).unwrap();

        assert_eq!(log.append(Record::new("a")).unwrap(), 16);
        assert_eq!(log.append(Record::new("b")).unwrap(), 17);
        assert_eq!(log.lowest_offset().unwrap(), 16);
        assert!(log.read(15).unwrap_err().is_not_found());
        assert_eq!(log.read(17).unwrap().value, b"b");
        assert!(dir.path().join("16.store").exists());
    }

    #[test]
    fn test_rollover_by_store() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(32, 1024)).unwrap();

        for i in 0..3 {
            assert_eq!(log.append(Record::new("hello world")).unwrap(), i);
        }
        assert!(log.segment_count().unwrap() > 1);

        for i in 0..3 {
            let record = log.read(i).unwrap();
            assert_eq!(record.value, b"hello world");
            assert_eq!(record.offset, i);
        }
    }

    #[test]
    fn test_rollover_by_index() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(4096, ENTRY_WIDTH * 3)).unwrap();

        for i in 0..4 {
            assert_eq!(log.append(Record::new("hello world")).unwrap(), i);
        }

        let infos = log.segments_info().unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].base_offset, 0);
        assert_eq!(infos[0].next_offset, 3);
        assert_eq!(infos[1].base_offset, 3);
        assert_eq!(infos[1].next_offset, 4);

        for i in 0..4 {
            assert_eq!(log.read(i).unwrap().offset, i);
        }
    }

    #[test]
    fn test_record_filling_store_rolls_over() {
        let dir = tempdir().unwrap();
        let framed = LEN_WIDTH + Record::new("hello world").encoded_len().unwrap();
        let log = Log::new(dir.path(), test_config(framed * 2, 1024)).unwrap();

        log.append(Record::new("hello world")).unwrap();
        assert_eq!(log.segment_count().unwrap(), 1);

        // Exactly fills the remaining capacity
        log.append(Record::new("hello world")).unwrap();
        assert_eq!(log.segment_count().unwrap(), 2);

        assert_eq!(log.append(Record::new("hello world")).unwrap(), 2);
        assert_eq!(log.segments_info().unwrap()[1].base_offset, 2);
    }

    #[test]
    fn test_oversized_record_is_accepted() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(16, 1024)).unwrap();

        let big = vec![7u8; 100];
        assert_eq!(log.append(Record::new(big.clone())).unwrap(), 0);
        assert_eq!(log.append(Record::new("small")).unwrap(), 1);
        assert_eq!(log.read(0).unwrap().value, big);
        assert_eq!(log.segment_count().unwrap(), 3);
    }

    #[test]
    fn test_init_with_existing_segments() {
        let dir = tempdir().unwrap();
        let config = test_config(32, 1024);

        let log = Log::new(dir.path(), config.clone()).unwrap();
        for i in 0..3 {
            assert_eq!(log.append(Record::new("hello world")).unwrap(), i);
        }
        log.close().unwrap();

        let log = Log::new(dir.path(), config).unwrap();
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 2);
        assert_eq!(log.read(2).unwrap().value, b"hello world");

        for _ in 0..3 {
            log.append(Record::new("hello world again")).unwrap();
        }
        assert_eq!(log.highest_offset().unwrap(), 5);
        let record = log.read(5).unwrap();
        assert_eq!(record.value, b"hello world again");
        assert_eq!(record.offset, 5);
    }

    #[test]
    fn test_reopen_with_smaller_index_rolls_over() {
        let dir = tempdir().unwrap();

        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();
        for i in 0..5 {
            assert_eq!(log.append(Record::new("hello world")).unwrap(), i);
        }
        log.close().unwrap();

        // Five entries no longer fit in a three-entry index
        let log = Log::new(dir.path(), test_config(1024, ENTRY_WIDTH * 3)).unwrap();
        assert_eq!(log.segment_count().unwrap(), 1);

        assert_eq!(log.append(Record::new("after")).unwrap(), 5);
        assert_eq!(log.append(Record::new("after again")).unwrap(), 6);
        assert_eq!(log.segment_count().unwrap(), 2);
        assert_eq!(log.segments_info().unwrap()[1].base_offset, 5);

        for i in 0..5 {
            assert_eq!(log.read(i).unwrap().value, b"hello world");
        }
        assert_eq!(log.read(5).unwrap().value, b"after");
        assert_eq!(log.read(6).unwrap().value, b"after again");
    }

    #[test]
    fn test_append_after_failed_rollover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let framed = LEN_WIDTH + Record::new("hello world").encoded_len().unwrap();
        let log = Log::new(&path, test_config(framed, 1024)).unwrap();

        // A directory squatting on the next store name makes the rollover fail
        std::fs::create_dir(path.join("1.store")).unwrap();
        assert_eq!(log.append(Record::new("hello world")).unwrap(), 0);
        assert_eq!(log.segment_count().unwrap(), 1);

        // Still maxed: the next append retries the rollover
        assert!(log.append(Record::new("hello world")).is_err());

        std::fs::remove_dir(path.join("1.store")).unwrap();
        assert_eq!(log.append(Record::new("hello world")).unwrap(), 1);
        assert_eq!(log.segment_count().unwrap(), 3);
        assert_eq!(log.read(0).unwrap().offset, 0);
        assert_eq!(log.read(1).unwrap().offset, 1);
    }

    #[test]
    fn test_reopen_preserves_every_record() {
        let dir = tempdir().unwrap();
        let config = test_config(128, ENTRY_WIDTH * 4);

        let log = Log::new(dir.path(), config.clone()).unwrap();
        for i in 0..20u64 {
            log.append(Record::new(format!("record-{}", i))).unwrap();
        }
        let before = log.segments_info().unwrap();
        log.close().unwrap();

        // Clean close shrinks every index to its written entries
        for info in &before {
            let path = dir.path().join(format!("{}.index", info.base_offset));
            let len = std::fs::metadata(path).unwrap().len();
            assert_eq!(len, (info.next_offset - info.base_offset) * ENTRY_WIDTH);
        }

        let log = Log::new(dir.path(), config).unwrap();
        assert_eq!(log.segments_info().unwrap(), before);
        for i in 0..20u64 {
            assert_eq!(log.read(i).unwrap().value, format!("record-{}", i).as_bytes());
        }
    }

    #[test]
    fn test_truncate() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(32, 1024)).unwrap();

        for i in 0..3 {
            assert_eq!(log.append(Record::new("hello world")).unwrap(), i);
        }
        assert_eq!(log.highest_offset().unwrap(), 2);

        log.truncate(1).unwrap();

        assert!(log.read(0).unwrap_err().is_not_found());
        assert!(log.read(1).unwrap_err().is_not_found());
        assert_eq!(log.read(2).unwrap().value, b"hello world");
        assert_eq!(log.lowest_offset().unwrap(), 2);
        assert_eq!(log.highest_offset().unwrap(), 2);
        assert!(!dir.path().join("0.store").exists());
        assert!(!dir.path().join("0.index").exists());
    }

    #[test]
    fn test_truncate_everything_keeps_offsets_monotonic() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }

        log.truncate(10).unwrap();
        assert_eq!(log.segment_count().unwrap(), 1);
        assert_eq!(log.lowest_offset().unwrap(), 3);
        assert!(log.read(2).unwrap_err().is_not_found());

        assert_eq!(log.append(Record::new("next")).unwrap(), 3);
        assert_eq!(log.read(3).unwrap().value, b"next");
    }

    #[test]
    fn test_reader() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();
        assert_eq!(log.append(Record::new("hello world")).unwrap(), 0);

        let mut bytes = Vec::new();
        log.reader().unwrap().read_to_end(&mut bytes).unwrap();

        let len = BigEndian::read_u64(&bytes[..LEN_WIDTH as usize]);
        assert_eq!(len as usize, bytes.len() - LEN_WIDTH as usize);

        let record = Record::decode(&bytes[LEN_WIDTH as usize..]).unwrap();
        assert_eq!(record.value, b"hello world");
        assert_eq!(record.offset, 0);
    }

    #[test]
    fn test_reader_spans_segments() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(32, 1024)).unwrap();
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }

        let mut bytes = Vec::new();
        log.reader().unwrap().read_to_end(&mut bytes).unwrap();

        let mut cursor = 0usize;
        let mut offsets = Vec::new();
        while cursor < bytes.len() {
            let len = BigEndian::read_u64(&bytes[cursor..cursor + 8]) as usize;
            let record = Record::decode(&bytes[cursor + 8..cursor + 8 + len]).unwrap();
            offsets.push(record.offset);
            cursor += 8 + len;
        }
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log = Log::new(&path, test_config(32, 1024)).unwrap();
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }

        log.reset().unwrap();

        assert_eq!(log.segment_count().unwrap(), 1);
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 0);
        assert!(log.read(0).unwrap_err().is_not_found());
        assert_eq!(log.append(Record::new("fresh")).unwrap(), 0);
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log = Log::new(&path, test_config(1024, 1024)).unwrap();
        log.append(Record::new("hello world")).unwrap();

        log.remove().unwrap();
        assert!(!path.exists());
        assert!(matches!(
            log.append(Record::new("late")),
            Err(Error::ClosedFile(_))
        ));
    }

    #[test]
    fn test_closed_log_rejects_operations() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(1024, 1024)).unwrap();
        log.append(Record::new("hello world")).unwrap();
        log.close().unwrap();

        assert!(matches!(log.read(0), Err(Error::ClosedFile(_))));
        assert!(matches!(
            log.append(Record::new("late")),
            Err(Error::ClosedFile(_))
        ));
    }

    #[test]
    fn test_random_payloads() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(512, ENTRY_WIDTH * 8)).unwrap();
        let mut rng = rand::thread_rng();

        let payloads: Vec<Vec<u8>> = (0..100)
            .map(|_| {
                let len = rng.gen_range(0..200);
                (0..len).map(|_| rng.gen()).collect()
            })
            .collect();

        for (i, payload) in payloads.iter().enumerate() {
            assert_eq!(log.append(Record::new(payload.clone())).unwrap(), i as u64);
        }
        for (i, payload) in payloads.iter().enumerate() {
            assert_eq!(&log.read(i as u64).unwrap().value, payload);
        }
    }

    #[test]
    fn test_concurrent_readers_and_appender() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path(), test_config(256, ENTRY_WIDTH * 8)).unwrap();
        log.append(Record::new("record-0")).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 1..200u64 {
                    assert_eq!(log.append(Record::new(format!("record-{}", i))).unwrap(), i);
                }
            });

            for _ in 0..4 {
                s.spawn(|| loop {
                    let highest = log.highest_offset().unwrap();
                    for offset in 0..=highest {
                        let record = log.read(offset).unwrap();
                        assert_eq!(record.offset, offset);
                        assert_eq!(record.value, format!("record-{}", offset).as_bytes());
                    }
                    match log.read(highest + 1) {
                        Ok(record) => assert_eq!(record.offset, highest + 1),
                        Err(e) => assert!(e.is_not_found()),
                    }
                    if highest == 199 {
                        break;
                    }
                });
            }
        });
    }
}
