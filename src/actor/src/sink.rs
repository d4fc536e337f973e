//! Output formatters EXPORTER relays matches to (`SPEC_FULL.md` §1): a
//! structured in-memory sink for tests and embedding, and a line-printing
//! sink for the CLI's `export line` subcommand.

use std::sync::{Arc, Mutex};

use tracing::info;

use vast_common::event::Event;
use vast_common::Result;

/// A destination for matched events. Implementations must be cheap to
/// clone (they're held by the exporter actor and handed out to callers),
/// so the trait is implemented over a `Clone` handle rather than taking
/// `&mut self`.
pub trait Sink: Send + Sync {
    fn accept(&self, event: &Event) -> Result<()>;
}

pub type SinkHandle = Arc<dyn Sink>;

/// Collects every matched event in memory, in arrival order. Used by
/// tests and by embedders that want the result set as a `Vec`.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(MemorySink::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Sink for MemorySink {
    fn accept(&self, event: &Event) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Writes one JSON object per matched event, newline-delimited, to
/// stdout — the `export line` CLI subcommand's destination.
pub struct LineSink;

impl LineSink {
    pub fn new() -> Arc<Self> {
        Arc::new(LineSink)
    }
}

impl Sink for LineSink {
    fn accept(&self, event: &Event) -> Result<()> {
        let line = serde_json::to_string(event)?;
        println!("{line}");
        info!(id = event.id, "emitted match");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_common::value::Value;

    #[test]
    fn memory_sink_preserves_arrival_order() {
        let sink = MemorySink::new();
        sink.accept(&Event::new(1, "t", 0, Value::Bool(true))).unwrap();
        sink.accept(&Event::new(2, "t", 0, Value::Bool(false))).unwrap();
        let ids: Vec<_> = sink.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
