//! On-disk envelope for a bitmap index (`spec.md` §4.2, `SPEC_FULL.md` §4.2).
//!
//! Every index persists as `{version, type, highest_id, body}`; reopening an
//! index whose recorded `version` doesn't match the current format is a
//! `schema`-class error rather than a silent misread of stale bytes.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use vast_common::event::EventId;
use vast_common::{Error, Result};

/// Bumped whenever the on-disk layout of a concrete index's `body` changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct OnDisk<T> {
    version: u32,
    type_name: String,
    highest_id: Option<EventId>,
    body: T,
}

pub fn save<T: Serialize>(
    path: &Path,
    type_name: &str,
    highest_id: Option<EventId>,
    body: &T,
) -> Result<()> {
    let file = File::create(path)?;
    let envelope = OnDisk {
        version: FORMAT_VERSION,
        type_name: type_name.to_string(),
        highest_id,
        body,
    };
    serde_json::to_writer(BufWriter::new(file), &envelope)?;
    Ok(())
}

pub fn load<T: DeserializeOwned>(path: &Path, expected_type_name: &str) -> Result<(Option<EventId>, T)> {
    let file = File::open(path)?;
    let envelope: OnDisk<T> = serde_json::from_reader(BufReader::new(file))?;
    if envelope.version != FORMAT_VERSION {
        return Err(Error::schema(format!(
            "index {path:?} has format version {}, expected {FORMAT_VERSION}",
            envelope.version
        )));
    }
    if envelope.type_name != expected_type_name {
        return Err(Error::schema(format!(
            "index {path:?} holds a {} index, expected {expected_type_name}",
            envelope.type_name
        )));
    }
    Ok((envelope.highest_id, envelope.body))
}
