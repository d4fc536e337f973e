//! EXPORTER: the state machine that turns a query's accumulated hit
//! bitstream into concrete, candidate-checked events delivered to sinks
//! (`spec.md` §4.5).
//!
//! States are *init* (registering collaborators), *idle* (query sent,
//! waiting for hits), *waiting* (a chunk has been requested from ARCHIVE),
//! *extracting* (walking a chunk's unprocessed ids), and *done*. This
//! module doesn't model them as a literal enum with transition functions;
//! `drive` re-derives what to do next from `hits`, `processed`, and
//! `pending` every time it's called, which collapses *idle*/*waiting*/
//! *extracting* into one re-entrant routine without losing any of the
//! states' decision points. Because `drive` always runs a chunk fetch to
//! completion (or to a budget pause) before returning control to the
//! actor's mailbox loop, there is never a fetch "in flight" across two
//! separate messages to reason about.

use std::sync::Arc;

use tracing::{info, warn};

use tokio::sync::mpsc;

use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::accountant::Accountant;
use vast_common::event::EventId;
use vast_common::schema::Schema;
use vast_expr::{eval_event, resolve_schema, resolve_types, Expr};

use crate::context::Context;
use crate::message::{
    ArchiveHandle, ArchiveMsg, ExporterHandle, ExporterMsg, IndexHandle, IndexMsg, QueryEvent,
    QueryOptions, TaskHandle, TaskMsg,
};
use crate::sink::SinkHandle;

pub struct ExporterConfig {
    pub schema: Arc<Schema>,
}

struct Exporter {
    schema: Arc<Schema>,
    archives: Vec<ArchiveHandle>,
    indexes: Vec<IndexHandle>,
    sinks: Vec<SinkHandle>,
    accountant: Option<Arc<dyn Accountant>>,

    resolved_expr: Option<Expr>,
    hits: EwahBitstream,
    processed: EwahBitstream,
    indexes_total: usize,
    indexes_done: usize,

    pending: u64,
    unbounded: bool,
    stopped: bool,
    done: bool,
    subscribers: Vec<TaskHandle>,
}

impl Exporter {
    fn new(schema: Arc<Schema>) -> Self {
        Exporter {
            schema,
            archives: Vec::new(),
            indexes: Vec::new(),
            sinks: Vec::new(),
            accountant: None,
            resolved_expr: None,
            hits: EwahBitstream::new(),
            processed: EwahBitstream::new(),
            indexes_total: 0,
            indexes_done: 0,
            pending: 0,
            unbounded: false,
            stopped: false,
            done: false,
            subscribers: Vec::new(),
        }
    }

    /// Notifies every waiter registered via `ExporterMsg::Subscribe` that
    /// the current query has reached `done`. Called right after any state
    /// transition that could have flipped `done` to `true`.
    async fn notify_subscribers_if_done(&mut self) {
        if !self.done {
            return;
        }
        for sub in self.subscribers.drain(..) {
            let _ = sub.send(TaskMsg::SubtaskDone).await;
        }
    }

    fn record_error(&self, kind: &str) {
        if let Some(a) = &self.accountant {
            a.record_error(kind);
        }
    }

    async fn run(
        &mut self,
        expr: Expr,
        event_type: String,
        options: QueryOptions,
        query_tx: mpsc::Sender<QueryEvent>,
    ) {
        let ty = match self.schema.resolve(&event_type) {
            Ok(ty) => ty.clone(),
            Err(err) => {
                warn!(error = %err, "unknown event type for query");
                self.record_error("schema");
                self.done = true;
                return;
            }
        };
        let resolved = match resolve_types(&resolve_schema(&expr, &ty)) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "query failed to resolve");
                self.record_error("query");
                self.done = true;
                return;
            }
        };
        self.resolved_expr = Some(resolved.clone());
        self.hits = EwahBitstream::new();
        self.processed = EwahBitstream::new();
        self.indexes_done = 0;
        self.indexes_total = self.indexes.len();
        self.done = self.indexes_total == 0;
        for index in &self.indexes {
            let _ = index
                .send(IndexMsg::Query {
                    expr: resolved.clone(),
                    event_type: event_type.clone(),
                    options,
                    reply: query_tx.clone(),
                })
                .await;
        }
    }

    fn unprocessed(&self) -> EwahBitstream {
        let mut u = self.hits.clone();
        u.subtract(&self.processed);
        u
    }

    fn has_budget(&self) -> bool {
        self.unbounded || self.pending > 0
    }

    fn consume_budget(&mut self) {
        if !self.unbounded {
            self.pending = self.pending.saturating_sub(1);
        }
    }

    fn maybe_complete(&mut self) -> bool {
        if self.indexes_done < self.indexes_total {
            return false;
        }
        if self.unprocessed().count() == 0 {
            self.done = true;
            return true;
        }
        false
    }

    /// Re-derives the next action from current state: fetch the next
    /// chunk, extract from it under the current budget, or complete.
    /// Called after every event that could have changed the picture
    /// (a hit arriving, `extract`, `stop`, a chunk landing).
    async fn drive(&mut self) {
        if self.done {
            return;
        }
        if self.stopped {
            self.done = true;
            return;
        }
        loop {
            if !self.has_budget() {
                return;
            }
            let unprocessed = self.unprocessed();
            let next = unprocessed.find_first();
            if next == vast_bitstream::NPOS {
                if self.maybe_complete() {
                    return;
                }
                return;
            }
            if self.archives.is_empty() {
                warn!("no archive registered to resolve a hit");
                self.record_error("actor");
                self.done = true;
                return;
            }
            let chunk = self.fetch_chunk(next).await;
            let Some(chunk) = chunk else {
                // Unreadable chunk: mark every id it would have covered as
                // processed so the exporter doesn't spin on it forever.
                self.processed.append(next + 1 - self.processed.size(), true);
                continue;
            };
            let resolved = self.resolved_expr.clone().expect("run() sets this before drive()");
            let base = chunk.meta.base;
            let end = base + chunk.meta.count;
            // Advance `processed` up to `base` first: ids below a chunk's
            // range that are still unprocessed belong to gaps no archive
            // could resolve.
            if self.processed.size() < base {
                self.processed.append(base - self.processed.size(), true);
            }
            let mut id = base.max(self.processed.size());
            while id < end {
                if unprocessed.get(id) {
                    if !self.has_budget() {
                        break;
                    }
                    if let Some(event) = chunk.event(id) {
                        match eval_event(&resolved, event) {
                            Ok(true) => {
                                for sink in &self.sinks {
                                    if let Err(err) = sink.accept(event) {
                                        warn!(error = %err, "sink rejected event");
                                        self.record_error("io");
                                    }
                                }
                                self.consume_budget();
                            }
                            Ok(false) => {}
                            Err(err) => {
                                warn!(error = %err, "candidate check failed");
                                self.record_error("query");
                            }
                        }
                    }
                }
                self.processed.append(1, true);
                id += 1;
            }
            if self.stopped {
                self.done = true;
                return;
            }
        }
    }

    async fn fetch_chunk(&self, id: EventId) -> Option<Arc<vast_archive::Chunk>> {
        for archive in &self.archives {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if archive.send(ArchiveMsg::Lookup { id, reply: tx }).await.is_err() {
                continue;
            }
            match rx.await {
                Ok(Ok(chunk)) => return Some(chunk),
                Ok(Err(_)) | Err(_) => continue,
            }
        }
        None
    }
}

/// Spawns the exporter. The returned handle accepts `put*`/`Run`/
/// `Extract`/`Stop`; nothing happens until `Run` registers a query.
pub fn spawn(config: ExporterConfig) -> ExporterHandle {
    let (handle, mut rx) = Context::channel();
    let (query_tx, mut query_rx) = mpsc::channel::<QueryEvent>(256);
    tokio::spawn(async move {
        let mut state = Exporter::new(config.schema);
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(ExporterMsg::PutArchive(a)) => state.archives.push(a),
                        Some(ExporterMsg::PutIndex(i)) => state.indexes.push(i),
                        Some(ExporterMsg::PutSink(s)) => state.sinks.push(s),
                        Some(ExporterMsg::PutAccountant(a)) => state.accountant = Some(a),
                        Some(ExporterMsg::Run { expr, event_type, options }) => {
                            state.run(expr, event_type, options, query_tx.clone()).await;
                            state.drive().await;
                        }
                        Some(ExporterMsg::Extract(n)) => {
                            if n == 0 {
                                state.unbounded = true;
                            } else {
                                state.pending = state.pending.saturating_add(n);
                            }
                            state.drive().await;
                        }
                        Some(ExporterMsg::Stop) => {
                            state.stopped = true;
                            state.drive().await;
                        }
                        Some(ExporterMsg::Subscribe(reply)) => {
                            if state.done {
                                let _ = reply.send(TaskMsg::SubtaskDone).await;
                            } else {
                                state.subscribers.push(reply);
                            }
                        }
                        None => break,
                    }
                }
                event = query_rx.recv() => {
                    match event {
                        Some(QueryEvent::Task(_)) => {}
                        Some(QueryEvent::Progress { remaining, total }) => {
                            tracing::debug!(remaining, total, "query progress");
                        }
                        Some(QueryEvent::Hits(bits)) => {
                            if state.hits.size() < bits.size() {
                                state.hits.append(bits.size() - state.hits.size(), false);
                            }
                            state.hits.or(&bits);
                            state.drive().await;
                        }
                        Some(QueryEvent::Done { .. }) => {
                            state.indexes_done += 1;
                            state.drive().await;
                        }
                        None => {}
                    }
                }
            }
            state.notify_subscribers_if_done().await;
            if state.done {
                info!("exporter done");
                break;
            }
        }
    });
    handle
}
