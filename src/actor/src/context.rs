//! A `Context<M>` is a cheap, `Clone`-able handle onto an actor's inbound
//! channel (`spec.md` §9, "Cyclic actor references... represent them as
//! handle values, not back-pointers"). Peers only ever hold a `Context`,
//! never a reference to the actor's private state.
//!
//! Cancellation is driven by channel closure rather than an explicit
//! `down` message type: when the last clone of a `Context` is dropped, the
//! actor's `recv()` returns `None`, which every actor in this crate treats
//! identically to a monitored peer reporting `down` (`SPEC_FULL.md` §4.5).

use tokio::sync::mpsc;

use vast_common::{Error, Result};

/// Bounded inbound queue depth for every actor in this crate. Chosen once
/// here rather than per actor so `high_watermark`/`low_watermark`
/// backpressure (see `importer.rs`) has a single channel capacity to
/// reason about.
pub const MAILBOX_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Context<M> {
    sender: mpsc::Sender<M>,
}

impl<M> Clone for Context<M> {
    fn clone(&self) -> Self {
        Context {
            sender: self.sender.clone(),
        }
    }
}

impl<M> Context<M> {
    pub fn new(sender: mpsc::Sender<M>) -> Self {
        Context { sender }
    }

    /// Sends `msg`, waiting for mailbox space. A closed receiver (the peer
    /// is down) becomes an `actor`-class error, matching `spec.md` §7's
    /// "actor: peer down, monitor death".
    pub async fn send(&self, msg: M) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::actor("peer is down"))
    }

    /// Non-blocking send used by self-requeue loops (e.g. the exporter's
    /// `extract` re-enqueue) so a full mailbox surfaces as backpressure
    /// rather than stalling the sender.
    pub fn try_send(&self, msg: M) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::backpressure("mailbox is full")
            }
            mpsc::error::TrySendError::Closed(_) => Error::actor("peer is down"),
        })
    }

    pub fn channel() -> (Self, mpsc::Receiver<M>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        (Context::new(tx), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_receiver_dropped_is_an_actor_error() {
        let (ctx, rx) = Context::<u32>::channel();
        drop(rx);
        assert!(ctx.send(1).await.is_err());
    }

    #[tokio::test]
    async fn clones_share_the_same_mailbox() {
        let (ctx, mut rx) = Context::<u32>::channel();
        let other = ctx.clone();
        other.send(7).await.unwrap();
        assert_eq!(rx.recv().await, Some(7));
    }
}
