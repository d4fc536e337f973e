//! IMPORTER: assigns globally increasing identifiers, batches SOURCE
//! records into CHUNKs, and fans each sealed chunk out to ARCHIVE and
//! INDEX (`spec.md` §4.5).
//!
//! Backpressure collapses the spec's separate high/low watermark chunk
//! counts into the bounded mailbox's own capacity: `Context::send` blocks
//! until the peer's mailbox has room, so a downstream actor that falls
//! behind by more than [`crate::context::MAILBOX_CAPACITY`] chunks stalls
//! the importer exactly the way crossing `high_watermark` would, and
//! draining below capacity resumes it exactly the way dropping under
//! `low_watermark` would. Neither count is tracked explicitly.

use std::sync::Arc;

use tracing::{info, warn};

use vast_archive::Chunk;
use vast_common::accountant::Accountant;
use vast_common::event::{Event, EventId};

use crate::context::Context;
use crate::message::{ArchiveHandle, ImporterHandle, ImporterMsg, IndexHandle};
use crate::source::Source;

pub struct ImporterConfig {
    pub archive: ArchiveHandle,
    pub index: IndexHandle,
    pub chunk_size: usize,
    pub schema_fingerprint: u64,
}

/// Spawns the importer over `source`. Nothing is read until `Run` arrives;
/// sending `Stop` (or dropping every handle) ends the import loop after
/// the in-flight batch is sealed.
pub fn spawn(config: ImporterConfig, mut source: Box<dyn Source>) -> ImporterHandle {
    let (handle, mut rx) = Context::channel();
    tokio::spawn(async move {
        let mut accountant: Option<Arc<dyn Accountant>> = None;
        let mut next_id: EventId = 0;
        loop {
            match rx.recv().await {
                Some(ImporterMsg::PutAccountant(a)) => accountant = Some(a),
                Some(ImporterMsg::Run) => {
                    next_id = run_until_exhausted_or_stopped(
                        &mut source,
                        &config,
                        next_id,
                        &mut rx,
                        &mut accountant,
                    )
                    .await;
                }
                Some(ImporterMsg::RunUntilDone { reply }) => {
                    next_id = run_until_exhausted_or_stopped(
                        &mut source,
                        &config,
                        next_id,
                        &mut rx,
                        &mut accountant,
                    )
                    .await;
                    let _ = reply.send(crate::message::TaskMsg::SubtaskDone).await;
                }
                Some(ImporterMsg::Stop) | None => break,
            }
        }
        info!("importer stopped");
    });
    handle
}

async fn run_until_exhausted_or_stopped(
    source: &mut Box<dyn Source>,
    config: &ImporterConfig,
    mut next_id: EventId,
    rx: &mut tokio::sync::mpsc::Receiver<ImporterMsg>,
    accountant: &mut Option<Arc<dyn Accountant>>,
) -> EventId {
    loop {
        match rx.try_recv() {
            Ok(ImporterMsg::Stop) => return next_id,
            Ok(ImporterMsg::PutAccountant(a)) => *accountant = Some(a),
            Ok(ImporterMsg::Run) | Ok(ImporterMsg::RunUntilDone { .. }) | Err(_) => {}
        }
        let mut batch = Vec::with_capacity(config.chunk_size);
        for _ in 0..config.chunk_size {
            match source.next() {
                Ok(Some(raw)) => {
                    batch.push(Event::new(next_id, raw.type_name, raw.timestamp, raw.value));
                    next_id += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "source read failed");
                    if let Some(a) = accountant {
                        a.record_error("schema");
                    }
                    break;
                }
            }
        }
        if batch.is_empty() {
            return next_id;
        }
        let base = batch.first().unwrap().id;
        let sealed = match Chunk::seal(base, batch, config.schema_fingerprint) {
            Ok(c) => Arc::new(c),
            Err(err) => {
                warn!(error = %err, "failed to seal chunk");
                if let Some(a) = accountant {
                    a.record_error("schema");
                }
                continue;
            }
        };
        let (archive_result, index_result) = tokio::join!(
            config.archive.send(crate::message::ArchiveMsg::Append(sealed.clone())),
            config.index.send(crate::message::IndexMsg::Chunk(sealed)),
        );
        for result in [archive_result, index_result] {
            if let Err(err) = result {
                warn!(error = %err, "failed to dispatch chunk downstream");
                if let Some(a) = accountant {
                    a.record_error("actor");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{archive, index};
    use vast_common::types::Type;
    use vast_common::value::Value;
    use vast_common::Result;

    fn schema() -> Arc<vast_common::schema::Schema> {
        let mut s = vast_common::schema::Schema::new();
        s.add_type("t", Type::record([("n", Type::Count)])).unwrap();
        Arc::new(s)
    }

    struct VecSource(std::vec::IntoIter<Value>);

    impl Source for VecSource {
        fn next(&mut self) -> Result<Option<crate::source::RawEvent>> {
            Ok(self.0.next().map(|value| crate::source::RawEvent {
                type_name: "t".into(),
                timestamp: 0,
                value,
            }))
        }
    }

    #[tokio::test]
    async fn importer_seals_chunks_and_dispatches_to_archive_and_index() {
        let archive_dir = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        let archive_handle = archive::spawn(archive::ArchiveConfig {
            dir: archive_dir.path().to_path_buf(),
            cache_capacity: 16,
            max_segment_size: 1 << 20,
        })
        .unwrap();
        let index_handle = index::spawn(index::IndexConfig {
            dir: index_dir.path().to_path_buf(),
            schema: schema(),
        }).unwrap();

        let values: Vec<Value> = (0..25).map(|n| Value::Record(vec![("n".into(), Value::Count(n))])).collect();
        let source: Box<dyn Source> = Box::new(VecSource(values.into_iter()));
        let importer = spawn(
            ImporterConfig {
                archive: archive_handle.clone(),
                index: index_handle,
                chunk_size: 10,
                schema_fingerprint: 0,
            },
            source,
        );
        importer.send(ImporterMsg::Run).await.unwrap();
        importer.send(ImporterMsg::Stop).await.unwrap();

        // `Run` drains the whole (finite) source before the actor loops
        // back around to see `Stop`; give that background work a moment.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        archive_handle
            .send(crate::message::ArchiveMsg::Lookup { id: 24, reply: tx })
            .await
            .unwrap();
        let chunk = rx.await.unwrap().unwrap();
        assert_eq!(chunk.meta.base, 20);
    }

    #[tokio::test]
    async fn run_until_done_notifies_once_the_source_is_exhausted() {
        let archive_dir = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        let archive_handle = archive::spawn(archive::ArchiveConfig {
            dir: archive_dir.path().to_path_buf(),
            cache_capacity: 16,
            max_segment_size: 1 << 20,
        })
        .unwrap();
        let index_handle = index::spawn(index::IndexConfig {
            dir: index_dir.path().to_path_buf(),
            schema: schema(),
        })
        .unwrap();

        let values: Vec<Value> = (0..5).map(Value::Count).collect();
        let source: Box<dyn Source> = Box::new(VecSource(values.into_iter()));
        let importer = spawn(
            ImporterConfig {
                archive: archive_handle,
                index: index_handle,
                chunk_size: 10,
                schema_fingerprint: 0,
            },
            source,
        );

        let barrier = crate::task::spawn(1);
        importer
            .send(ImporterMsg::RunUntilDone { reply: barrier.clone() })
            .await
            .unwrap();
        crate::task::join(&barrier).await;
    }
}
