//! Command bodies behind each CLI subcommand: wires up ARCHIVE/INDEX/
//! IMPORTER/EXPORTER the way a single-node embedder would, drives them to
//! completion, and tears them down. None of this touches `clap` — [`cli`]
//! owns argument parsing and only calls into here.

use std::path::Path;
use std::sync::Arc;

use vast_actor::{
    task, ArchiveConfig, ArchiveHandle, ArchiveMsg, ExporterConfig, ExporterMsg, ImporterConfig,
    ImporterMsg, IndexConfig, IndexHandle, IndexMsg, JsonLineSource, LineSink, MemorySink,
    QueryOptions, SinkHandle, Source, TestGenerator,
};
use vast_common::accountant::{Accountant, InMemoryAccountant};
use vast_common::config::Config;
use vast_common::schema::Schema;
use vast_common::Result;

use crate::schema_file;

pub async fn import_test(schema_path: &Path, count: usize, config: &Config) -> Result<()> {
    let (schema, type_name) = schema_file::load_single(schema_path)?;
    let ty = schema.resolve(&type_name)?.clone();
    let source: Box<dyn Source> = Box::new(TestGenerator::new(type_name.clone(), ty, count));
    run_import(schema, type_name, source, config).await
}

pub async fn import_json(schema_path: &Path, file: &Path, config: &Config) -> Result<()> {
    let (schema, type_name) = schema_file::load_single(schema_path)?;
    let ty = schema.resolve(&type_name)?.clone();
    let source: Box<dyn Source> = Box::new(JsonLineSource::open(file, type_name.clone(), ty)?);
    run_import(schema, type_name, source, config).await
}

async fn run_import(
    schema: Schema,
    type_name: String,
    source: Box<dyn Source>,
    config: &Config,
) -> Result<()> {
    let accountant = InMemoryAccountant::new();
    let fingerprint = schema.resolve(&type_name)?.fingerprint();
    let (archive, index) = open_store(&schema, config)?;
    archive
        .send(ArchiveMsg::PutAccountant(accountant.clone() as Arc<dyn Accountant>))
        .await?;
    index
        .send(IndexMsg::PutAccountant(accountant.clone() as Arc<dyn Accountant>))
        .await?;

    let importer = vast_actor::spawn_importer(
        ImporterConfig {
            archive: archive.clone(),
            index: index.clone(),
            chunk_size: config.chunk_size,
            schema_fingerprint: fingerprint,
        },
        source,
    );
    importer
        .send(ImporterMsg::PutAccountant(accountant.clone() as Arc<dyn Accountant>))
        .await?;

    let done = task::spawn(1);
    importer.send(ImporterMsg::RunUntilDone { reply: done.clone() }).await?;
    task::join(&done).await;
    let _ = importer.send(ImporterMsg::Stop).await;

    flush(&archive, &index).await?;

    let snapshot = accountant.snapshot();
    tracing::info!(?snapshot, "import complete");
    Ok(())
}

pub async fn export_json(schema_path: &Path, query: &str, config: &Config) -> Result<()> {
    let (schema, type_name) = schema_file::load_single(schema_path)?;
    let sink = MemorySink::new();
    run_export(schema, &type_name, query, config, sink.clone() as SinkHandle).await?;
    let events = sink.events();
    println!("{}", serde_json::to_string(&events)?);
    Ok(())
}

pub async fn export_line(schema_path: &Path, query: &str, config: &Config) -> Result<()> {
    let (schema, type_name) = schema_file::load_single(schema_path)?;
    run_export(schema, &type_name, query, config, LineSink::new() as SinkHandle).await
}

async fn run_export(
    schema: Schema,
    type_name: &str,
    query: &str,
    config: &Config,
    sink: SinkHandle,
) -> Result<()> {
    let expr = vast_expr::parse(query)?;
    let (archive, index) = open_store(&schema, config)?;
    let exporter = vast_actor::spawn_exporter(ExporterConfig {
        schema: Arc::new(schema),
    });
    exporter.send(ExporterMsg::PutArchive(archive)).await?;
    exporter.send(ExporterMsg::PutIndex(index)).await?;
    exporter.send(ExporterMsg::PutSink(sink)).await?;
    exporter
        .send(ExporterMsg::Run {
            expr,
            event_type: type_name.to_string(),
            options: QueryOptions::empty(),
        })
        .await?;
    exporter.send(ExporterMsg::Extract(0)).await?;

    let done = task::spawn(1);
    exporter.send(ExporterMsg::Subscribe(done.clone())).await?;
    task::join(&done).await;
    let _ = exporter.send(ExporterMsg::Stop).await;
    Ok(())
}

/// Opens (creating if absent) the ARCHIVE and INDEX actors rooted at
/// `config`. INDEX rehydrates from whatever a previous `import` already
/// flushed to `config.index_dir()`.
fn open_store(schema: &Schema, config: &Config) -> Result<(ArchiveHandle, IndexHandle)> {
    let archive = vast_actor::spawn_archive(ArchiveConfig {
        dir: config.archive_dir(),
        cache_capacity: config.cache_capacity,
        max_segment_size: config.max_segment_size,
    })?;
    let index = vast_actor::spawn_index(IndexConfig {
        dir: config.index_dir(),
        schema: Arc::new(schema.clone()),
    })?;
    Ok((archive, index))
}

async fn flush(archive: &ArchiveHandle, index: &IndexHandle) -> Result<()> {
    let barrier = task::spawn(2);
    archive.send(ArchiveMsg::Flush { reply: barrier.clone() }).await?;
    index.send(IndexMsg::Flush { reply: barrier.clone() }).await?;
    task::join(&barrier).await;
    Ok(())
}

pub async fn status(config: &Config) -> Result<()> {
    let archive_chunks = vast_archive::ArchiveStore::open(
        &config.archive_dir(),
        config.cache_capacity,
        config.max_segment_size,
    )
    .map(|s| s.len())
    .unwrap_or(0);
    let index_shards = count_index_shards(&config.index_dir());
    println!(
        "{}",
        serde_json::json!({
            "root": config.root,
            "archive_chunks": archive_chunks,
            "index_shards": index_shards,
        })
    );
    Ok(())
}

/// Counts leaf shard files under `<dir>/<event-type>/<field-label>`
/// without going through INDEX's own (private) shard bookkeeping, the
/// same directory shape [`vast_actor::spawn_index`] itself rehydrates
/// from.
fn count_index_shards(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| std::fs::read_dir(e.path()).ok())
        .map(|inner| inner.flatten().filter(|f| f.path().is_file()).count())
        .sum()
}
