//! Metrics collection for packet statistics.
//!
//! Thread-safe counters tracking verdicts per kernel queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-queue statistics.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Packets delivered by the kernel.
    pub received: Counter,
    /// Packets answered with ACCEPT.
    pub accepted: Counter,
    /// Packets answered with DROP.
    pub dropped: Counter,
    /// Verdict replies that failed.
    pub failed: Counter,
}

impl QueueStats {
    /// Creates new queue statistics initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registry of per-queue statistics.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queues: RwLock<HashMap<u16, Arc<QueueStats>>>,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics handle for a queue, created on first use.
    pub fn queue(&self, qid: u16) -> Arc<QueueStats> {
        if let Some(stats) = self.queues.read().unwrap().get(&qid) {
            return stats.clone();
        }
        let mut queues = self.queues.write().unwrap();
        queues.entry(qid).or_default().clone()
    }

    /// Statistics handle for a queue, if it was ever started.
    pub fn get(&self, qid: u16) -> Option<Arc<QueueStats>> {
        self.queues.read().unwrap().get(&qid).cloned()
    }

    /// Registered queue ids.
    pub fn qids(&self) -> Vec<u16> {
        let mut qids: Vec<u16> = self.queues.read().unwrap().keys().copied().collect();
        qids.sort_unstable();
        qids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(2);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_registry_reuses_handles() {
        let registry = MetricsRegistry::new();
        let a = registry.queue(1);
        let b = registry.queue(1);
        a.received.inc();
        assert_eq!(b.received.get(), 1);
        assert_eq!(registry.qids(), vec![1]);
        assert!(registry.get(2).is_none());
    }
}
