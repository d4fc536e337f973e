//! A chunk is a bounded, immutable batch of events sharing a contiguous
//! identifier range (`spec.md` §3).

use serde::{Deserialize, Serialize};

use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::event::{Event, EventId};
use vast_common::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub base: EventId,
    pub count: u64,
    pub first_ts: i64,
    pub last_ts: i64,
    pub schema_fingerprint: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub meta: ChunkMeta,
    /// Identifier bitmap over the *global* id space: false up to `base`,
    /// true for `count` bits from there. Cheap under EWAH compression
    /// regardless of `base`'s magnitude.
    pub ids: EwahBitstream,
    events: Vec<Event>,
}

impl Chunk {
    /// Seals a batch of events with contiguous, ascending identifiers
    /// starting at `base` into an immutable chunk.
    pub fn seal(base: EventId, events: Vec<Event>, schema_fingerprint: u64) -> Result<Chunk> {
        if events.is_empty() {
            return Err(Error::query("cannot seal an empty chunk"));
        }
        for (i, e) in events.iter().enumerate() {
            if e.id != base + i as u64 {
                return Err(Error::schema(format!(
                    "chunk events must be contiguous: expected id {}, found {}",
                    base + i as u64,
                    e.id
                )));
            }
        }
        let count = events.len() as u64;
        let first_ts = events.first().unwrap().timestamp;
        let last_ts = events.last().unwrap().timestamp;
        let mut ids = EwahBitstream::new();
        ids.append(base, false);
        ids.append(count, true);
        Ok(Chunk {
            meta: ChunkMeta {
                base,
                count,
                first_ts,
                last_ts,
                schema_fingerprint,
            },
            ids,
            events,
        })
    }

    pub fn contains(&self, id: EventId) -> bool {
        id >= self.meta.base && id < self.meta.base + self.meta.count
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        if !self.contains(id) {
            return None;
        }
        self.events.get((id - self.meta.base) as usize)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn reader(&self) -> ChunkReader<'_> {
        ChunkReader { chunk: self, pos: 0 }
    }
}

/// Lazily walks a chunk's events, by sequence or by random-access id
/// (`spec.md` §4.3's `chunk::reader`).
pub struct ChunkReader<'a> {
    chunk: &'a Chunk,
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn read(&mut self) -> Option<&'a Event> {
        let e = self.chunk.events.get(self.pos)?;
        self.pos += 1;
        Some(e)
    }

    pub fn read_at(&self, id: EventId) -> Option<&'a Event> {
        self.chunk.event(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_common::value::Value;

    fn make_event(id: EventId) -> Event {
        Event::new(id, "t", 0, Value::Bool(true))
    }

    #[test]
    fn seal_bounds_ids_bitmap_to_the_chunk_range() {
        let events = (110..113).map(make_event).collect();
        let chunk = Chunk::seal(110, events, 42).unwrap();
        assert_eq!(chunk.ids.find_first(), 110);
        assert_eq!(chunk.ids.find_last(), 112);
    }

    #[test]
    fn seal_rejects_non_contiguous_ids() {
        let events = vec![make_event(0), make_event(2)];
        assert!(Chunk::seal(0, events, 0).is_err());
    }

    #[test]
    fn reader_supports_sequential_and_random_access() {
        let events = (5..8).map(make_event).collect();
        let chunk = Chunk::seal(5, events, 0).unwrap();
        let mut r = chunk.reader();
        assert_eq!(r.read().unwrap().id, 5);
        assert_eq!(r.read().unwrap().id, 6);
        assert_eq!(r.read_at(7).unwrap().id, 7);
        assert!(r.read_at(100).is_none());
    }
}
