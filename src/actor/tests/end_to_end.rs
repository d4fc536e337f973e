//! Exercises the full IMPORTER/ARCHIVE/INDEX/EXPORTER graph together,
//! wired the way `vast_cli::commands` wires it, against the chunk
//! round-trip, end-to-end query, and cancellation scenarios.

use std::sync::Arc;

use vast_bitstream::Bitstream;
use vast_actor::{
    archive::{spawn as spawn_archive, ArchiveConfig},
    exporter::{spawn as spawn_exporter, ExporterConfig},
    importer::{spawn as spawn_importer, ImporterConfig},
    index::{spawn as spawn_index, IndexConfig},
    message::{ArchiveMsg, ExporterMsg, ImporterMsg, QueryOptions},
    sink::MemorySink,
    source::{RawEvent, Source},
    task,
};
use vast_archive::Chunk;
use vast_common::event::Event;
use vast_common::schema::Schema;
use vast_common::types::Type;
use vast_common::value::Value;
use vast_common::Result;

struct VecSource(std::vec::IntoIter<(String, Value)>);

impl Source for VecSource {
    fn next(&mut self) -> Result<Option<RawEvent>> {
        Ok(self.0.next().map(|(type_name, value)| RawEvent {
            type_name,
            timestamp: 0,
            value,
        }))
    }
}

#[tokio::test]
async fn chunk_round_trip_splits_113_events_into_10_sized_segments() {
    let archive_dir = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();

    let mut schema = Schema::new();
    schema.add_type("t", Type::record([("n", Type::Count)])).unwrap();
    let schema = Arc::new(schema);

    let archive = spawn_archive(ArchiveConfig {
        dir: archive_dir.path().to_path_buf(),
        cache_capacity: 16,
        max_segment_size: 1 << 20,
    })
    .unwrap();
    let index = spawn_index(IndexConfig { dir: index_dir.path().to_path_buf(), schema }).unwrap();

    let values: Vec<(String, Value)> = (0..113)
        .map(|n| ("t".to_string(), Value::Record(vec![("n".into(), Value::Count(n))])))
        .collect();
    let source: Box<dyn Source> = Box::new(VecSource(values.into_iter()));
    let importer = spawn_importer(
        ImporterConfig {
            archive: archive.clone(),
            index,
            chunk_size: 10,
            schema_fingerprint: 0,
        },
        source,
    );

    let done = task::spawn(1);
    importer.send(ImporterMsg::RunUntilDone { reply: done.clone() }).await.unwrap();
    task::join(&done).await;

    let (tx, rx) = tokio::sync::oneshot::channel();
    archive.send(ArchiveMsg::Lookup { id: 112, reply: tx }).await.unwrap();
    let chunk = rx.await.unwrap().unwrap();
    assert_eq!(chunk.ids.find_first(), 110);
    assert_eq!(chunk.ids.find_last(), 112);
    assert_eq!(chunk.meta.count, 3);
}

fn tls_schema() -> Arc<Schema> {
    let mut schema = Schema::new();
    schema
        .add_type(
            "conn",
            Type::record([
                ("id", Type::record([("resp_p", Type::Port)])),
                ("ssl", Type::record([("server_name", Type::String)])),
            ]),
        )
        .unwrap();
    Arc::new(schema)
}

fn tls_event(id: u64, port: &str, server_name: &str) -> Event {
    let value = Value::Record(vec![
        (
            "id".into(),
            Value::Record(vec![("resp_p".into(), Value::Port(port.parse().unwrap()))]),
        ),
        (
            "ssl".into(),
            Value::Record(vec![("server_name".into(), Value::String(server_name.into()))]),
        ),
    ]);
    Event::new(id, "conn", 0, value)
}

/// 15 events on port 995 with "mozilla" in the server name, interleaved
/// with near-misses on either predicate alone.
fn tls_log() -> Vec<Event> {
    let mut events = Vec::new();
    let mut id = 0u64;
    for _ in 0..15 {
        events.push(tls_event(id, "995/tcp", "www.mozilla.org"));
        id += 1;
        events.push(tls_event(id, "443/tcp", "www.mozilla.org"));
        id += 1;
        events.push(tls_event(id, "995/tcp", "example.com"));
        id += 1;
    }
    events
}

#[tokio::test]
async fn end_to_end_query_extracts_exactly_the_matching_events() {
    let schema = tls_schema();
    let archive_dir = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    let archive = spawn_archive(ArchiveConfig {
        dir: archive_dir.path().to_path_buf(),
        cache_capacity: 16,
        max_segment_size: 1 << 20,
    })
    .unwrap();
    let index = spawn_index(IndexConfig { dir: index_dir.path().to_path_buf(), schema: schema.clone() }).unwrap();

    let events = tls_log();
    let chunk = Arc::new(Chunk::seal(0, events, 0).unwrap());
    archive.send(ArchiveMsg::Append(chunk.clone())).await.unwrap();
    index.send(vast_actor::message::IndexMsg::Chunk(chunk)).await.unwrap();

    let expr = vast_expr::parse(r#"id.resp_p == 995/? && "mozilla" in ssl.server_name"#).unwrap();

    let sink = MemorySink::new();
    let exporter = spawn_exporter(ExporterConfig { schema });
    exporter.send(ExporterMsg::PutArchive(archive)).await.unwrap();
    exporter.send(ExporterMsg::PutIndex(index)).await.unwrap();
    exporter.send(ExporterMsg::PutSink(sink.clone())).await.unwrap();
    exporter
        .send(ExporterMsg::Run { expr, event_type: "conn".into(), options: QueryOptions::empty() })
        .await
        .unwrap();
    exporter.send(ExporterMsg::Extract(0)).await.unwrap();

    let done = task::spawn(1);
    exporter.send(ExporterMsg::Subscribe(done.clone())).await.unwrap();
    task::join(&done).await;

    let matched = sink.events();
    assert_eq!(matched.len(), 15);
    let mut ids: Vec<_> = matched.iter().map(|e| e.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 15, "no duplicate events");
    for e in &matched {
        assert_eq!(e.field("ssl.server_name"), Some(&Value::String("www.mozilla.org".into())));
    }
}

#[tokio::test]
async fn stop_after_five_matches_delivers_exactly_five_and_closes() {
    let schema = tls_schema();
    let archive_dir = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    let archive = spawn_archive(ArchiveConfig {
        dir: archive_dir.path().to_path_buf(),
        cache_capacity: 16,
        max_segment_size: 1 << 20,
    })
    .unwrap();
    let index = spawn_index(IndexConfig { dir: index_dir.path().to_path_buf(), schema: schema.clone() }).unwrap();

    let events = tls_log();
    let chunk = Arc::new(Chunk::seal(0, events, 0).unwrap());
    archive.send(ArchiveMsg::Append(chunk.clone())).await.unwrap();
    index.send(vast_actor::message::IndexMsg::Chunk(chunk)).await.unwrap();

    let expr = vast_expr::parse(r#"id.resp_p == 995/? && "mozilla" in ssl.server_name"#).unwrap();

    let sink = MemorySink::new();
    let exporter = spawn_exporter(ExporterConfig { schema });
    exporter.send(ExporterMsg::PutArchive(archive)).await.unwrap();
    exporter.send(ExporterMsg::PutIndex(index)).await.unwrap();
    exporter.send(ExporterMsg::PutSink(sink.clone())).await.unwrap();
    exporter
        .send(ExporterMsg::Run { expr, event_type: "conn".into(), options: QueryOptions::empty() })
        .await
        .unwrap();

    exporter.send(ExporterMsg::Extract(5)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(sink.events().len(), 5);

    exporter.send(ExporterMsg::Stop).await.unwrap();

    let done = task::spawn(1);
    exporter.send(ExporterMsg::Subscribe(done.clone())).await.unwrap();
    task::join(&done).await;

    assert_eq!(sink.events().len(), 5, "stop must not deliver further matches");

    // A further extract after `stop` has no effect: the actor has already
    // broken out of its mailbox loop and the handle is disconnected.
    assert!(exporter.send(ExporterMsg::Extract(10)).await.is_err());
    assert_eq!(sink.events().len(), 5);
}
