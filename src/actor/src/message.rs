//! The message contract excerpted in `spec.md` §6, typed as Rust enums
//! instead of tagged tuples. One enum per actor kind; `QueryOptions` is the
//! bitset of `{historical, continuous, low-priority}`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use vast_common::accountant::Accountant;
use vast_common::event::EventId;
use vast_archive::Chunk;
use vast_bitstream::EwahBitstream;
use vast_common::Result;
use vast_expr::Expr;

use crate::context::Context;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryOptions: u8 {
        const HISTORICAL = 0b001;
        const CONTINUOUS = 0b010;
        const LOW_PRIORITY = 0b100;
    }
}

pub type TaskId = u64;

/// One event delivered to a query's reply channel, mirroring the
/// `(task)`, `bitstream*`, `done(runtime, expr)` sequence from `spec.md`
/// §6.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    Task(TaskId),
    Hits(EwahBitstream),
    Progress { remaining: usize, total: usize },
    Done { runtime: Duration, expr: Expr },
}

pub type ArchiveHandle = Context<ArchiveMsg>;
pub type IndexHandle = Context<IndexMsg>;
pub type ImporterHandle = Context<ImporterMsg>;
pub type ExporterHandle = Context<ExporterMsg>;
pub type TaskHandle = Context<TaskMsg>;

pub enum ArchiveMsg {
    PutAccountant(Arc<dyn Accountant>),
    Append(Arc<Chunk>),
    Lookup {
        id: EventId,
        reply: oneshot::Sender<Result<Arc<Chunk>>>,
    },
    Flush {
        reply: TaskHandle,
    },
    Stop,
}

pub enum IndexMsg {
    PutAccountant(Arc<dyn Accountant>),
    Chunk(Arc<Chunk>),
    Query {
        expr: Expr,
        event_type: String,
        options: QueryOptions,
        reply: mpsc::Sender<QueryEvent>,
    },
    Flush {
        reply: TaskHandle,
    },
    Stop,
}

pub enum ImporterMsg {
    PutAccountant(Arc<dyn Accountant>),
    Run,
    /// Like `Run`, but reports `TaskMsg::SubtaskDone` to `reply` once the
    /// source is exhausted or `Stop` arrives, for a caller outside the
    /// actor graph (e.g. a CLI command) that needs to know the import is
    /// over without polling.
    RunUntilDone {
        reply: TaskHandle,
    },
    Stop,
}

pub enum ExporterMsg {
    PutArchive(ArchiveHandle),
    PutIndex(IndexHandle),
    PutSink(crate::sink::SinkHandle),
    PutAccountant(Arc<dyn Accountant>),
    Run {
        expr: Expr,
        event_type: String,
        options: QueryOptions,
    },
    Extract(u64),
    /// Registers `reply` to receive `TaskMsg::SubtaskDone` once the current
    /// query reaches its `done` state (immediately, if it already has).
    Subscribe(TaskHandle),
    Stop,
}

pub enum TaskMsg {
    /// One of the task's registered subtasks has reported completion.
    SubtaskDone,
    /// Registers a subscriber that gets exactly one `()` when every
    /// subtask has reported done.
    Subscribe(oneshot::Sender<()>),
}
