//! ARCHIVE's chunk store (`spec.md` §4.3): an in-memory interval map from
//! id to segment location, a bounded LRU cache of deserialized chunks
//! (grounded on the block-cache pattern in `hummock/block_cache.rs`: cache
//! keyed by a handle, capacity-bounded, evicts on insert), and a directory
//! scan at startup that reconstructs the map from each segment's trailing
//! index without touching chunk payloads.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tracing::{info, warn};

use vast_common::event::EventId;
use vast_common::{Error, Result};

use crate::chunk::Chunk;
use crate::segment::{SegmentIndexEntry, SegmentReader, SegmentWriter};

#[derive(Clone)]
struct Location {
    segment: PathBuf,
    entry: SegmentIndexEntry,
    quarantined: bool,
}

pub struct ArchiveStore {
    dir: PathBuf,
    max_segment_size: u64,
    locations: Vec<Location>,
    cache: LruCache<EventId, Arc<Chunk>>,
    writer: Option<SegmentWriter>,
}

impl ArchiveStore {
    /// Opens (or creates) the archive directory, scanning any existing
    /// segment files to rebuild the interval map. A segment whose trailing
    /// index can't be read (e.g. truncated by a crash mid-write) is logged
    /// and skipped rather than failing the whole store.
    pub fn open(dir: &Path, cache_capacity: usize, max_segment_size: u64) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut locations = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match SegmentReader::open(&path) {
                Ok(reader) => {
                    for e in reader.entries() {
                        locations.push(Location {
                            segment: path.clone(),
                            entry: e.clone(),
                            quarantined: false,
                        });
                    }
                }
                Err(err) => {
                    warn!(segment = %path.display(), error = %err, "skipping unreadable segment");
                }
            }
        }
        locations.sort_by_key(|l| l.entry.base);
        info!(segments = ?locations.len(), "archive store opened");
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Ok(ArchiveStore {
            dir: dir.to_path_buf(),
            max_segment_size,
            locations,
            cache: LruCache::new(capacity),
            writer: None,
        })
    }

    /// Persists a sealed chunk, rolling to a fresh segment file first if
    /// the current one has reached `max_segment_size`.
    pub fn append(&mut self, chunk: &Chunk) -> Result<()> {
        if self
            .writer
            .as_ref()
            .is_some_and(|w| w.bytes_written() >= self.max_segment_size)
        {
            self.roll()?;
        }
        if self.writer.is_none() {
            self.writer = Some(SegmentWriter::create(&self.dir)?);
        }
        let writer = self.writer.as_mut().unwrap();
        writer.append(chunk)?;
        let entry = writer.last_entry().expect("append just recorded one").clone();
        self.locations.push(Location {
            segment: writer.path().to_path_buf(),
            entry,
            quarantined: false,
        });
        self.locations.sort_by_key(|l| l.entry.base);
        self.cache.put(chunk.meta.base, Arc::new(chunk.clone()));
        Ok(())
    }

    fn roll(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }

    /// Flushes the currently open segment's trailing index so it's
    /// readable by a fresh `ArchiveStore::open` (e.g. before shutdown).
    pub fn flush(&mut self) -> Result<()> {
        self.roll()
    }

    pub fn lookup(&mut self, id: EventId) -> Result<Arc<Chunk>> {
        let idx = self
            .locations
            .iter()
            .position(|l| !l.quarantined && l.entry.base <= id && id < l.entry.base + l.entry.count)
            .ok_or_else(|| Error::query(format!("no chunk covers id {id}")))?;

        if let Some(cached) = self.cache.get(&self.locations[idx].entry.base) {
            return Ok(cached.clone());
        }

        let location = self.locations[idx].clone();
        let mut reader = SegmentReader::open(&location.segment)?;
        match reader.read_chunk(&location.entry) {
            Ok(chunk) => {
                let chunk = Arc::new(chunk);
                self.cache.put(location.entry.base, chunk.clone());
                Ok(chunk)
            }
            Err(err) => {
                warn!(base = location.entry.base, error = %err, "quarantining corrupt chunk");
                self.locations[idx].quarantined = true;
                Err(Error::query(format!(
                    "chunk covering id {id} is unavailable: {err}"
                )))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locations.iter().filter(|l| !l.quarantined).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_common::event::Event;
    use vast_common::value::Value;

    fn make_chunk(base: EventId, count: u64) -> Chunk {
        let events = (base..base + count)
            .map(|id| Event::new(id, "t", 0, Value::Bool(true)))
            .collect();
        Chunk::seal(base, events, 1).unwrap()
    }

    #[test]
    fn append_then_lookup_round_trips_via_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::open(dir.path(), 16, 1 << 20).unwrap();
        store.append(&make_chunk(0, 10)).unwrap();
        store.append(&make_chunk(10, 3)).unwrap();
        let chunk = store.lookup(11).unwrap();
        assert_eq!(chunk.meta.base, 10);
        assert_eq!(chunk.meta.count, 3);
    }

    #[test]
    fn reopen_after_flush_rebuilds_the_interval_map() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = ArchiveStore::open(dir.path(), 16, 1 << 20).unwrap();
            store.append(&make_chunk(0, 10)).unwrap();
            store.flush().unwrap();
        }
        let mut reopened = ArchiveStore::open(dir.path(), 16, 1 << 20).unwrap();
        let chunk = reopened.lookup(3).unwrap();
        assert_eq!(chunk.meta.base, 0);
    }

    #[test]
    fn lookup_of_unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::open(dir.path(), 16, 1 << 20).unwrap();
        store.append(&make_chunk(0, 5)).unwrap();
        assert!(store.lookup(999).is_err());
    }
}
