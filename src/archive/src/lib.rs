//! ARCHIVE: durable storage for sealed chunks (`spec.md` §4.3).
//!
//! Chunks are written to append-only segment files, each followed by a
//! trailing index mapping id ranges to byte offsets. `ArchiveStore` keeps
//! those ranges in memory, caches recently read chunks, and quarantines
//! any chunk that fails its checksum on read rather than propagating a
//! panic into the caller.

pub mod chunk;
pub mod segment;
pub mod store;

pub use chunk::{Chunk, ChunkMeta, ChunkReader};
pub use segment::{SegmentIndexEntry, SegmentReader, SegmentWriter};
pub use store::ArchiveStore;
