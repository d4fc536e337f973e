//! The message-passing dataflow runtime (`spec.md` §4.5): IMPORTER reads a
//! [`source::Source`], seals chunks, and fans them out to ARCHIVE and
//! INDEX; EXPORTER turns a query's accumulated hits into candidate-checked
//! events delivered to a [`sink::Sink`]. Every actor is a `tokio` task
//! addressed only through a [`context::Context`] handle — no actor ever
//! touches another's private state directly.

pub mod archive;
pub mod context;
pub mod exporter;
pub mod importer;
pub mod index;
pub mod message;
pub mod sink;
pub mod source;
pub mod task;

pub use archive::{spawn as spawn_archive, ArchiveConfig};
pub use context::{Context, MAILBOX_CAPACITY};
pub use exporter::{spawn as spawn_exporter, ExporterConfig};
pub use importer::{spawn as spawn_importer, ImporterConfig};
pub use index::{spawn as spawn_index, IndexConfig};
pub use message::{
    ArchiveHandle, ArchiveMsg, ExporterHandle, ExporterMsg, ImporterHandle, ImporterMsg,
    IndexHandle, IndexMsg, QueryEvent, QueryOptions, TaskHandle, TaskId, TaskMsg,
};
pub use sink::{LineSink, MemorySink, Sink, SinkHandle};
pub use source::{JsonLineSource, RawEvent, Source, TestGenerator};
