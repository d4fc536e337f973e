//! TASK: the generic barrier used to coordinate INDEX's query fan-out and
//! periodic flushes (`spec.md` §4.5, "generic barrier. Created with a set
//! of subtasks; subscribers get a single `done` when all subtasks have
//! reported done").

use tokio::sync::oneshot;

use crate::context::Context;
use crate::message::{TaskHandle, TaskMsg};

/// Spawns a barrier over `subtasks` subtasks and returns a handle to it.
/// Each `TaskMsg::SubtaskDone` received decrements the remaining count;
/// once it reaches zero every pending (and future) subscriber is notified.
pub fn spawn(subtasks: usize) -> TaskHandle {
    let (handle, mut rx) = Context::channel();
    tokio::spawn(async move {
        let mut remaining = subtasks;
        let mut subscribers: Vec<oneshot::Sender<()>> = Vec::new();
        let mut done = remaining == 0;
        while let Some(msg) = rx.recv().await {
            match msg {
                TaskMsg::SubtaskDone => {
                    if !done {
                        remaining = remaining.saturating_sub(1);
                        if remaining == 0 {
                            done = true;
                        }
                    }
                }
                TaskMsg::Subscribe(reply) => {
                    if done {
                        let _ = reply.send(());
                    } else {
                        subscribers.push(reply);
                    }
                }
            }
            if done {
                for sub in subscribers.drain(..) {
                    let _ = sub.send(());
                }
            }
        }
    });
    handle
}

/// Waits for `handle`'s barrier to complete.
pub async fn join(handle: &TaskHandle) {
    let (tx, rx) = oneshot::channel();
    if handle.send(TaskMsg::Subscribe(tx)).await.is_ok() {
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_subtasks_completes_immediately() {
        let handle = spawn(0);
        join(&handle).await;
    }

    #[tokio::test]
    async fn subscriber_waits_for_every_subtask() {
        let handle = spawn(2);
        handle.send(TaskMsg::SubtaskDone).await.unwrap();
        let h = handle.clone();
        let waiter = tokio::spawn(async move {
            join(&h).await;
        });
        // Let the waiter's `Subscribe` land in the mailbox behind the
        // first `SubtaskDone` before the second one is sent.
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        handle.send(TaskMsg::SubtaskDone).await.unwrap();
        waiter.await.unwrap();
    }
}
