//! Process configuration, loaded from a TOML file and overridable by the
//! host CLI. Field defaults mirror the batch/cache/watermark knobs named in
//! `spec.md` §3–§4.5.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// On-disk layout root; holds `archive/` and `index/` subdirectories.
    pub root: PathBuf,
    /// Number of events sealed into a chunk.
    pub chunk_size: usize,
    /// Maximum compressed bytes per archive segment before rolling.
    pub max_segment_size: u64,
    /// Number of deserialized chunks the archive keeps cached.
    pub cache_capacity: usize,
    /// IMPORTER pauses when a downstream actor falls behind by this many
    /// chunks.
    pub high_watermark: usize,
    /// IMPORTER resumes once the backlog drains to this many chunks.
    pub low_watermark: usize,
    /// How often the INDEX actor auto-flushes dirty bitmap shards.
    #[serde(with = "humantime_duration")]
    pub flush_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from("./vast.db"),
            chunk_size: 100,
            max_segment_size: 128 * 1024 * 1024,
            cache_capacity: 256,
            high_watermark: 10,
            low_watermark: 2,
            flush_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::schema(format!("invalid config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.low_watermark >= self.high_watermark {
            return Err(Error::schema(
                "low_watermark must be less than high_watermark",
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::schema("chunk_size must be positive"));
        }
        Ok(())
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
