//! INDEX actor: dispatches incoming chunks into per-`(event type, field
//! path)` bitmap index shards and answers queries by walking the
//! schema/type-resolved AST, delegating each leaf predicate to its shard
//! (`spec.md` §4.5).
//!
//! A field is only given a shard if its structural type maps onto one of
//! the bitmap index families in `vast_index` (address, port, string,
//! numeric); everything else — including metadata extractors like `id`
//! and `timestamp`, which are never materialized as their own shard —
//! looks up as "matches everything". This is a deliberate over-approximation
//! consistent with `spec.md` §4.4's index-mode note that "indexes may yield
//! supersets"; the exporter's event-mode candidate check narrows the
//! result before anything reaches a sink.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use vast_archive::Chunk;
use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::accountant::Accountant;
use vast_common::event::{Event, EventId};
use vast_common::schema::Schema;
use vast_common::types::Type;
use vast_common::value::Value;
use vast_common::{Error, Result};
use vast_index::{AddressIndex, NumericIndex, NumericKind, Op, PortIndex, StringIndex};
use vast_expr::{eval_index, Expr, Extractor, Predicate};

use crate::context::Context;
use crate::message::{IndexHandle, IndexMsg, QueryEvent, TaskMsg};

enum ShardIndex {
    Address(AddressIndex),
    Port(PortIndex),
    String(StringIndex),
    Numeric(NumericIndex),
}

impl ShardIndex {
    fn append(&mut self, id: EventId, value: &Value) -> Result<()> {
        match self {
            ShardIndex::Address(i) => i.append(id, value),
            ShardIndex::Port(i) => i.append(id, value),
            ShardIndex::String(i) => i.append(id, value),
            ShardIndex::Numeric(i) => i.append(id, value),
        }
    }

    fn lookup(&self, op: Op, value: &Value) -> Result<EwahBitstream> {
        match self {
            ShardIndex::Address(i) => i.lookup(op, value),
            ShardIndex::Port(i) => i.lookup(op, value),
            ShardIndex::String(i) => i.lookup(op, value),
            ShardIndex::Numeric(i) => i.lookup(op, value),
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        match self {
            ShardIndex::Address(i) => i.save(path),
            ShardIndex::Port(i) => i.save(path),
            ShardIndex::String(i) => i.save(path),
            ShardIndex::Numeric(i) => i.save(path),
        }
    }

    fn highest_id(&self) -> Option<EventId> {
        match self {
            ShardIndex::Address(i) => i.highest_id(),
            ShardIndex::Port(i) => i.highest_id(),
            ShardIndex::String(i) => i.highest_id(),
            ShardIndex::Numeric(i) => i.highest_id(),
        }
    }
}

/// Loads a previously flushed shard back into memory, dispatching on the
/// leaf's structural type the same way [`new_shard`] does for a fresh one.
fn load_shard(ty: &Type, path: &Path) -> Result<Option<ShardIndex>> {
    Ok(Some(match ty {
        Type::Address => ShardIndex::Address(AddressIndex::load(path)?),
        Type::Port => ShardIndex::Port(PortIndex::load(path)?),
        Type::String | Type::Pattern | Type::Enum(_) => ShardIndex::String(StringIndex::load(path)?),
        Type::Int => ShardIndex::Numeric(NumericIndex::load(path, NumericKind::Int)?),
        Type::Count => ShardIndex::Numeric(NumericIndex::load(path, NumericKind::Count)?),
        Type::Real => ShardIndex::Numeric(NumericIndex::load(path, NumericKind::Real)?),
        Type::TimePoint => ShardIndex::Numeric(NumericIndex::load(path, NumericKind::TimePoint)?),
        Type::TimeDuration => ShardIndex::Numeric(NumericIndex::load(path, NumericKind::TimeDuration)?),
        _ => return Ok(None),
    }))
}

fn new_shard(ty: &Type) -> Option<ShardIndex> {
    Some(match ty {
        Type::Address => ShardIndex::Address(AddressIndex::new()),
        Type::Port => ShardIndex::Port(PortIndex::new()),
        Type::String | Type::Pattern | Type::Enum(_) => ShardIndex::String(StringIndex::new()),
        Type::Int => ShardIndex::Numeric(NumericIndex::new(NumericKind::Int)),
        Type::Count => ShardIndex::Numeric(NumericIndex::new(NumericKind::Count)),
        Type::Real => ShardIndex::Numeric(NumericIndex::new(NumericKind::Real)),
        Type::TimePoint => ShardIndex::Numeric(NumericIndex::new(NumericKind::TimePoint)),
        Type::TimeDuration => ShardIndex::Numeric(NumericIndex::new(NumericKind::TimeDuration)),
        _ => return None,
    })
}

struct Leaf {
    path: Vec<usize>,
    label: String,
    ty: Type,
}

/// Flattens a record type's indexable scalar fields into dotted labels and
/// positional access paths, recursing into nested records.
fn leaf_fields(ty: &Type) -> Vec<Leaf> {
    fn walk(ty: &Type, path: &mut Vec<usize>, names: &mut Vec<String>, out: &mut Vec<Leaf>) {
        if let Type::Record(fields) = ty {
            for (i, field) in fields.iter().enumerate() {
                path.push(i);
                names.push(field.name.clone());
                if matches!(field.ty, Type::Record(_)) {
                    walk(&field.ty, path, names, out);
                } else if new_shard(&field.ty).is_some() {
                    out.push(Leaf {
                        path: path.clone(),
                        label: names.join("."),
                        ty: field.ty.clone(),
                    });
                }
                path.pop();
                names.pop();
            }
        }
    }
    let mut out = Vec::new();
    walk(ty, &mut Vec::new(), &mut Vec::new(), &mut out);
    out
}

fn value_at<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    let mut current = value;
    for &idx in path {
        match current {
            Value::Record(fields) => current = &fields.get(idx)?.1,
            _ => return None,
        }
    }
    Some(current)
}

fn all_true(len: u64) -> EwahBitstream {
    let mut b = EwahBitstream::new();
    b.append(len, true);
    b
}

fn count_predicates(expr: &Expr) -> usize {
    match expr {
        Expr::Const(_) | Expr::Predicate(_) => 1,
        Expr::Negation(inner) => count_predicates(inner),
        Expr::Conjunction(children) | Expr::Disjunction(children) => {
            children.iter().map(count_predicates).sum::<usize>().max(1)
        }
    }
}

struct Shards {
    dir: PathBuf,
    schema: Arc<Schema>,
    leaves: HashMap<String, Vec<Leaf>>,
    slots: HashMap<(String, Vec<usize>), (String, ShardIndex)>,
    next_id: EventId,
}

impl Shards {
    fn new(dir: PathBuf, schema: Arc<Schema>) -> Self {
        Shards {
            dir,
            schema,
            leaves: HashMap::new(),
            slots: HashMap::new(),
            next_id: 0,
        }
    }

    /// Rebuilds in-memory shards from a prior `flush()`, per the directory
    /// layout `<dir>/<event-type>/<field-label>`. An event type the schema
    /// no longer knows, or a shard file that fails to parse, is logged and
    /// skipped rather than failing the whole startup — consistent with how
    /// `vast_archive::ArchiveStore::open` treats an unreadable segment.
    fn open(dir: PathBuf, schema: Arc<Schema>) -> Result<Self> {
        let mut shards = Shards::new(dir.clone(), schema);
        if !dir.is_dir() {
            return Ok(shards);
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let event_type = entry.file_name().to_string_lossy().into_owned();
            let leaves = match shards.leaves_for(&event_type) {
                Ok(leaves) => leaves,
                Err(err) => {
                    warn!(event_type, error = %err, "skipping shards for unknown event type");
                    continue;
                }
            };
            for (path, label, ty) in leaves {
                let file = entry.path().join(&label);
                if !file.is_file() {
                    continue;
                }
                match load_shard(&ty, &file) {
                    Ok(Some(shard)) => {
                        shards.next_id = shards
                            .next_id
                            .max(shard.highest_id().map_or(0, |id| id + 1));
                        shards
                            .slots
                            .insert((event_type.clone(), path), (label, shard));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(event_type, label, error = %err, "skipping unreadable shard");
                    }
                }
            }
        }
        Ok(shards)
    }

    fn leaves_for(&mut self, event_type: &str) -> Result<Vec<(Vec<usize>, String, Type)>> {
        if let Some(cached) = self.leaves.get(event_type) {
            return Ok(cached.iter().map(|l| (l.path.clone(), l.label.clone(), l.ty.clone())).collect());
        }
        let ty = self.schema.resolve(event_type)?;
        let fields = leaf_fields(ty);
        let out = fields.iter().map(|l| (l.path.clone(), l.label.clone(), l.ty.clone())).collect();
        self.leaves.insert(event_type.to_string(), fields);
        Ok(out)
    }

    fn dispatch_event(&mut self, event: &Event) -> Result<()> {
        for (path, label, ty) in self.leaves_for(&event.type_name)? {
            let Some(value) = value_at(&event.value, &path) else {
                continue;
            };
            if matches!(value, Value::Absent) {
                continue;
            }
            let key = (event.type_name.clone(), path.clone());
            if !self.slots.contains_key(&key) {
                let shard = new_shard(&ty).expect("leaf_fields only yields indexable types");
                self.slots.insert(key.clone(), (label, shard));
            }
            self.slots.get_mut(&key).unwrap().1.append(event.id, value)?;
        }
        self.next_id = self.next_id.max(event.id + 1);
        Ok(())
    }

    fn dispatch_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        for event in chunk.events() {
            self.dispatch_event(event)?;
        }
        Ok(())
    }

    fn lookup(&self, event_type: &str, p: &Predicate) -> Result<EwahBitstream> {
        match &p.extractor {
            Extractor::Data { path, .. } => {
                match self.slots.get(&(event_type.to_string(), path.clone())) {
                    Some((_, shard)) => shard.lookup(p.op, &p.value),
                    None => Ok(all_true(self.next_id)),
                }
            }
            Extractor::Event(_) | Extractor::Type => Ok(all_true(self.next_id)),
            Extractor::Schema(path) => {
                Err(Error::query(format!("unresolved schema extractor: {path}")))
            }
        }
    }

    fn flush(&self) -> Result<()> {
        for ((event_type, _), (label, shard)) in self.slots.iter() {
            let dir = self.dir.join(event_type);
            std::fs::create_dir_all(&dir)?;
            shard.save(&dir.join(label))?;
        }
        Ok(())
    }
}

pub struct IndexConfig {
    pub dir: PathBuf,
    pub schema: Arc<Schema>,
}

/// Spawns the INDEX actor, rehydrating shards previously written by
/// `flush()` from `config.dir` before accepting any messages.
pub fn spawn(config: IndexConfig) -> Result<IndexHandle> {
    let shards = Shards::open(config.dir, config.schema)?;
    let (handle, mut rx) = Context::channel();
    tokio::spawn(async move {
        let mut shards = shards;
        let mut accountant: Option<Arc<dyn Accountant>> = None;
        let mut next_task_id = 0u64;
        while let Some(msg) = rx.recv().await {
            match msg {
                IndexMsg::PutAccountant(a) => accountant = Some(a),
                IndexMsg::Chunk(chunk) => {
                    if let Err(err) = shards.dispatch_chunk(&chunk) {
                        warn!(error = %err, "failed to index chunk");
                        if let Some(a) = &accountant {
                            a.record_error("schema");
                        }
                    }
                }
                IndexMsg::Query {
                    expr,
                    event_type,
                    options: _,
                    reply,
                } => {
                    let start = Instant::now();
                    let total = count_predicates(&expr).max(1);
                    let _ = reply.send(QueryEvent::Task(next_task_id)).await;
                    next_task_id += 1;
                    let universe_len = shards.next_id;
                    let mut seen = 0usize;
                    let mut lookup = |p: &Predicate| -> Result<EwahBitstream> {
                        let result = shards.lookup(&event_type, p);
                        seen += 1;
                        let _ = reply.try_send(QueryEvent::Progress {
                            remaining: total.saturating_sub(seen),
                            total,
                        });
                        result
                    };
                    match eval_index(&expr, universe_len, &mut lookup) {
                        Ok(hits) => {
                            let _ = reply.send(QueryEvent::Hits(hits)).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "query evaluation failed");
                            if let Some(a) = &accountant {
                                a.record_error("query");
                            }
                        }
                    }
                    let _ = reply
                        .send(QueryEvent::Done {
                            runtime: start.elapsed(),
                            expr,
                        })
                        .await;
                }
                IndexMsg::Flush { reply } => {
                    if let Err(err) = shards.flush() {
                        warn!(error = %err, "index flush failed");
                        if let Some(a) = &accountant {
                            a.record_error("io");
                        }
                    }
                    let _ = reply.send(TaskMsg::SubtaskDone).await;
                }
                IndexMsg::Stop => break,
            }
        }
    });
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use vast_common::address::Port;
    use vast_common::event::Event;
    use vast_expr::EventField;

    fn conn_schema() -> Arc<Schema> {
        let mut schema = Schema::new();
        schema
            .add_type(
                "conn",
                Type::record([("resp_p", Type::Port), ("server_name", Type::String)]),
            )
            .unwrap();
        Arc::new(schema)
    }

    fn conn_event(id: EventId, port: &str, name: &str) -> Arc<Chunk> {
        let value = Value::Record(vec![
            ("resp_p".into(), Value::Port(port.parse::<Port>().unwrap())),
            ("server_name".into(), Value::String(name.to_string())),
        ]);
        Arc::new(Chunk::seal(id, vec![Event::new(id, "conn", 0, value)], 0).unwrap())
    }

    #[tokio::test]
    async fn query_combines_per_field_shards() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(IndexConfig {
            dir: dir.path().to_path_buf(),
            schema: conn_schema(),
        }).unwrap();
        handle
            .send(IndexMsg::Chunk(conn_event(0, "995/tcp", "www.mozilla.org")))
            .await
            .unwrap();
        handle
            .send(IndexMsg::Chunk(conn_event(1, "80/tcp", "www.mozilla.org")))
            .await
            .unwrap();

        let expr = Expr::and(vec![
            Expr::predicate(
                Extractor::Data { path: vec![0], ty: Type::Port },
                Op::Eq,
                Value::Port("995/?".parse().unwrap()),
            ),
            Expr::predicate(
                Extractor::Data { path: vec![1], ty: Type::String },
                Op::In,
                Value::String("mozilla".into()),
            ),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        handle
            .send(IndexMsg::Query {
                expr: expr.clone(),
                event_type: "conn".into(),
                options: crate::message::QueryOptions::empty(),
                reply: tx,
            })
            .await
            .unwrap();

        let mut hits = None;
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            match event {
                QueryEvent::Hits(b) => hits = Some(b),
                QueryEvent::Done { .. } => {
                    saw_done = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_done);
        let hits = hits.unwrap();
        assert!(hits.get(0));
        assert!(!hits.get(1));
    }

    #[tokio::test]
    async fn unindexed_extractor_over_approximates_rather_than_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(IndexConfig {
            dir: dir.path().to_path_buf(),
            schema: conn_schema(),
        }).unwrap();
        handle
            .send(IndexMsg::Chunk(conn_event(0, "995/tcp", "x")))
            .await
            .unwrap();
        let expr = Expr::predicate(Extractor::Event(EventField::Timestamp), Op::Ge, Value::TimePoint(0));
        let (tx, mut rx) = mpsc::channel(16);
        handle
            .send(IndexMsg::Query {
                expr,
                event_type: "conn".into(),
                options: crate::message::QueryOptions::empty(),
                reply: tx,
            })
            .await
            .unwrap();
        let mut hits = None;
        while let Some(event) = rx.recv().await {
            if let QueryEvent::Hits(b) = &event {
                hits = Some(b.clone());
            }
            if matches!(event, QueryEvent::Done { .. }) {
                break;
            }
        }
        assert!(hits.unwrap().get(0));
    }

    #[tokio::test]
    async fn flush_then_reopen_answers_the_same_query() {
        let dir = tempfile::tempdir().unwrap();
        {
            let handle = spawn(IndexConfig {
                dir: dir.path().to_path_buf(),
                schema: conn_schema(),
            })
            .unwrap();
            handle
                .send(IndexMsg::Chunk(conn_event(0, "995/tcp", "www.mozilla.org")))
                .await
                .unwrap();
            handle
                .send(IndexMsg::Chunk(conn_event(1, "80/tcp", "www.mozilla.org")))
                .await
                .unwrap();
            let task = crate::task::spawn(1);
            handle.send(IndexMsg::Flush { reply: task.clone() }).await.unwrap();
            crate::task::join(&task).await;
        }

        let handle = spawn(IndexConfig {
            dir: dir.path().to_path_buf(),
            schema: conn_schema(),
        })
        .unwrap();
        let expr = Expr::predicate(
            Extractor::Data { path: vec![0], ty: Type::Port },
            Op::Eq,
            Value::Port("995/?".parse().unwrap()),
        );
        let (tx, mut rx) = mpsc::channel(16);
        handle
            .send(IndexMsg::Query {
                expr,
                event_type: "conn".into(),
                options: crate::message::QueryOptions::empty(),
                reply: tx,
            })
            .await
            .unwrap();
        let mut hits = None;
        while let Some(event) = rx.recv().await {
            if let QueryEvent::Hits(b) = &event {
                hits = Some(b.clone());
            }
            if matches!(event, QueryEvent::Done { .. }) {
                break;
            }
        }
        let hits = hits.unwrap();
        assert!(hits.get(0));
        assert!(!hits.get(1));
    }
}
