//! ARCHIVE actor: wraps a [`vast_archive::ArchiveStore`] behind a mailbox
//! so it can be driven purely by message passing, per `spec.md` §4.5's "no
//! shared mutable objects across actor boundaries".

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use vast_archive::ArchiveStore;
use vast_common::accountant::Accountant;
use vast_common::Result;

use crate::context::Context;
use crate::message::{ArchiveHandle, ArchiveMsg, TaskMsg};

pub struct ArchiveConfig {
    pub dir: PathBuf,
    pub cache_capacity: usize,
    pub max_segment_size: u64,
}

/// Spawns the ARCHIVE actor and returns a handle to its mailbox. Opening
/// the store (and thus scanning `dir`) happens synchronously before the
/// actor starts so callers observe a startup failure directly rather than
/// having it surface as a silent `actor` error on the first message.
pub fn spawn(config: ArchiveConfig) -> Result<ArchiveHandle> {
    let mut store = ArchiveStore::open(&config.dir, config.cache_capacity, config.max_segment_size)?;
    let (handle, mut rx) = Context::channel();
    tokio::spawn(async move {
        let mut accountant: Option<Arc<dyn Accountant>> = None;
        info!("archive actor running");
        while let Some(msg) = rx.recv().await {
            match msg {
                ArchiveMsg::PutAccountant(a) => accountant = Some(a),
                ArchiveMsg::Append(chunk) => {
                    if let Err(err) = store.append(&chunk) {
                        warn!(error = %err, "failed to persist chunk");
                        if let Some(a) = &accountant {
                            a.record_error("io");
                        }
                    }
                }
                ArchiveMsg::Lookup { id, reply } => {
                    let result = store.lookup(id);
                    if result.is_err() {
                        if let Some(a) = &accountant {
                            a.record_error("query");
                        }
                    }
                    let _ = reply.send(result);
                }
                ArchiveMsg::Flush { reply } => {
                    if let Err(err) = store.flush() {
                        warn!(error = %err, "archive flush failed");
                        if let Some(a) = &accountant {
                            a.record_error("io");
                        }
                    }
                    let _ = reply.send(TaskMsg::SubtaskDone).await;
                }
                ArchiveMsg::Stop => break,
            }
        }
        info!("archive actor stopped");
    });
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;
    use vast_archive::Chunk;
    use vast_common::event::Event;
    use vast_common::value::Value;

    fn make_chunk(base: u64, count: u64) -> Arc<Chunk> {
        let events = (base..base + count)
            .map(|id| Event::new(id, "t", 0, Value::Bool(true)))
            .collect();
        Arc::new(Chunk::seal(base, events, 0).unwrap())
    }

    #[tokio::test]
    async fn append_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(ArchiveConfig {
            dir: dir.path().to_path_buf(),
            cache_capacity: 16,
            max_segment_size: 1 << 20,
        })
        .unwrap();
        handle.send(ArchiveMsg::Append(make_chunk(0, 10))).await.unwrap();
        let (tx, rx) = oneshot::channel();
        handle
            .send(ArchiveMsg::Lookup { id: 5, reply: tx })
            .await
            .unwrap();
        let chunk = rx.await.unwrap().unwrap();
        assert_eq!(chunk.meta.base, 0);
    }

    #[tokio::test]
    async fn lookup_of_unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(ArchiveConfig {
            dir: dir.path().to_path_buf(),
            cache_capacity: 16,
            max_segment_size: 1 << 20,
        })
        .unwrap();
        let (tx, rx) = oneshot::channel();
        handle
            .send(ArchiveMsg::Lookup { id: 999, reply: tx })
            .await
            .unwrap();
        assert!(rx.await.unwrap().is_err());
    }
}
