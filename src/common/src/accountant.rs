//! A minimal metrics collector attachable to any actor via `put(accountant,
//! actor)` (`spec.md` §6). One counter increment per recoverable error, one
//! per completed query task.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Object-safe so actors can hold `Arc<dyn Accountant>` without knowing the
/// concrete sink.
pub trait Accountant: Send + Sync {
    fn record_error(&self, kind: &str);
    fn record_task_done(&self);
    fn snapshot(&self) -> HashMap<String, u64>;
}

#[derive(Default)]
pub struct InMemoryAccountant {
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryAccountant {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Accountant for InMemoryAccountant {
    fn record_error(&self, kind: &str) {
        *self.counters.lock().entry(format!("errors.{kind}")).or_insert(0) += 1;
    }

    fn record_task_done(&self) {
        *self.counters.lock().entry("tasks.done".to_string()).or_insert(0) += 1;
    }

    fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_by_kind() {
        let acc = InMemoryAccountant::new();
        acc.record_error("io");
        acc.record_error("io");
        acc.record_error("query");
        let snap = acc.snapshot();
        assert_eq!(snap.get("errors.io"), Some(&2));
        assert_eq!(snap.get("errors.query"), Some(&1));
    }
}
