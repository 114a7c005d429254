//! Global invocation ordering.
//!
//! Every attempted invocation takes a [`SequenceId`] from the run's
//! [`OrderingCounter`] right before the bridge is spawned. The counter is the
//! only mutable state shared between workers; the critical section is the
//! single `fetch_add`, never the invocation itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Globally unique, strictly increasing id of one invocation within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared sequence generator. Clones share the same counter.
#[derive(Debug, Clone)]
pub struct OrderingCounter {
    next: Arc<AtomicU64>,
}

impl OrderingCounter {
    /// First id handed out by a fresh counter.
    pub const INITIAL: u64 = 1;

    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(Self::INITIAL)),
        }
    }

    /// Read-then-increment.
    pub fn next_id(&self) -> SequenceId {
        SequenceId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// The id the next call to [`next_id`](Self::next_id) would return.
    pub fn peek(&self) -> SequenceId {
        SequenceId(self.next.load(Ordering::SeqCst))
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - Self::INITIAL
    }
}

impl Default for OrderingCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_starts_at_initial_and_increments() {
        let counter = OrderingCounter::new();
        assert_eq!(counter.next_id(), SequenceId(1));
        assert_eq!(counter.next_id(), SequenceId(2));
        assert_eq!(counter.peek(), SequenceId(3));
        assert_eq!(counter.issued(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let counter = OrderingCounter::new();
        let other = counter.clone();
        counter.next_id();
        assert_eq!(other.next_id(), SequenceId(2));
    }

    #[test]
    fn test_concurrent_ids_are_unique_and_contiguous() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 2_000;

        let counter = OrderingCounter::new();
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::with_capacity(PER_THREAD);
                    for _ in 0..PER_THREAD {
                        ids.push(counter.next_id());
                    }
                    ids
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // Strictly increasing within each thread
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }

        let total = (THREADS * PER_THREAD) as u64;
        assert_eq!(all.len() as u64, total);
        assert!(all.iter().all(|id| (1..=total).contains(&id.0)));
    }

    #[test]
    fn test_fresh_counter_restarts_sequence() {
        let first = OrderingCounter::new();
        first.next_id();
        first.next_id();
        let second = OrderingCounter::new();
        assert_eq!(second.next_id(), SequenceId(1));
    }
}
