//! An event is a typed record with a globally unique identifier assigned by
//! the importer (`spec.md` §3). Identifiers are contiguous and never reused.

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub type EventId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub type_name: String,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub value: Value,
}

impl Event {
    pub fn new(id: EventId, type_name: impl Into<String>, timestamp: i64, value: Value) -> Self {
        Event {
            id,
            type_name: type_name.into(),
            timestamp,
            value,
        }
    }

    pub fn field(&self, path: &str) -> Option<&Value> {
        self.value.as_record_field(path)
    }
}
