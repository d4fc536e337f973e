//! Segment files: `<root>/archive/<segment-uuid>` holds concatenated,
//! length-prefixed, checksummed chunks followed by a trailing index of
//! `(id-range -> offset)` (`spec.md` §6).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vast_common::event::EventId;
use vast_common::{Error, Result};

use crate::chunk::Chunk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentIndexEntry {
    pub base: EventId,
    pub count: u64,
    pub offset: u64,
    pub len: u64,
    pub crc32: u32,
}

pub struct SegmentWriter {
    path: PathBuf,
    file: File,
    index: Vec<SegmentIndexEntry>,
    bytes_written: u64,
}

impl SegmentWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Uuid::new_v4().to_string());
        let file = File::create(&path)?;
        Ok(SegmentWriter {
            path,
            file,
            index: Vec::new(),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The index entry recorded by the most recent `append`, if any.
    pub fn last_entry(&self) -> Option<&SegmentIndexEntry> {
        self.index.last()
    }

    pub fn append(&mut self, chunk: &Chunk) -> Result<()> {
        let offset = self.bytes_written;
        let bytes = serde_json::to_vec(chunk)?;
        let crc32 = crc32fast::hash(&bytes);
        self.file.write_all(&bytes)?;
        self.bytes_written += bytes.len() as u64;
        self.index.push(SegmentIndexEntry {
            base: chunk.meta.base,
            count: chunk.meta.count,
            offset,
            len: bytes.len() as u64,
            crc32,
        });
        Ok(())
    }

    /// Writes the trailing index and footer, returning the entries written
    /// so the caller can update its in-memory interval map without a
    /// re-scan.
    pub fn finish(mut self) -> Result<Vec<SegmentIndexEntry>> {
        let index_bytes = serde_json::to_vec(&self.index)?;
        self.file.write_all(&index_bytes)?;
        self.file.write_all(&self.bytes_written.to_le_bytes())?;
        self.file.flush()?;
        Ok(self.index)
    }
}

pub struct SegmentReader {
    path: PathBuf,
    file: File,
    index: Vec<SegmentIndexEntry>,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < 8 {
            return Err(Error::Io(format!(
                "segment {path:?} is truncated (shorter than its footer)"
            )));
        }
        file.seek(SeekFrom::End(-8))?;
        let mut footer = [0u8; 8];
        file.read_exact(&mut footer)?;
        let index_offset = u64::from_le_bytes(footer);
        if index_offset > len - 8 {
            return Err(Error::Io(format!(
                "segment {path:?} has a corrupt footer offset"
            )));
        }
        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_bytes = vec![0u8; (len - 8 - index_offset) as usize];
        file.read_exact(&mut index_bytes)?;
        let index: Vec<SegmentIndexEntry> = serde_json::from_slice(&index_bytes)?;
        Ok(SegmentReader {
            path: path.to_path_buf(),
            file,
            index,
        })
    }

    pub fn entries(&self) -> &[SegmentIndexEntry] {
        &self.index
    }

    pub fn read_chunk(&mut self, entry: &SegmentIndexEntry) -> Result<Chunk> {
        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.len as usize];
        self.file.read_exact(&mut buf)?;
        if crc32fast::hash(&buf) != entry.crc32 {
            return Err(Error::Io(format!(
                "corrupt chunk at {:?}:{} (crc mismatch)",
                self.path, entry.offset
            )));
        }
        Ok(serde_json::from_slice(&buf)?)
    }
}
