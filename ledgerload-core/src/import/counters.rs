use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Processed/discarded totals shared by every worker of a run.
///
/// Updated with fetch-and-add only. Exact values are only meaningful once
/// every worker has completed its stop rendezvous.
#[derive(Debug, Default)]
pub struct RunCounters {
    processed: AtomicUsize,
    discarded: AtomicUsize,
    abandoned: AtomicUsize,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_discarded(&self) -> usize {
        self.discarded.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Records left in a stopped worker's inbox that will never be applied.
    pub fn record_abandoned(&self) -> usize {
        self.abandoned.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            processed: self.processed.load(Ordering::Acquire),
            discarded: self.discarded.load(Ordering::Acquire),
            abandoned: self.abandoned.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub processed: usize,
    pub discarded: usize,
    pub abandoned: usize,
}

impl CounterSnapshot {
    pub fn settled(&self) -> usize {
        self.processed + self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(RunCounters::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let counters = Arc::clone(&counters);
            handles.push(tokio::spawn(async move {
                for _ in 0..500 {
                    if i % 2 == 0 {
                        counters.record_processed();
                    } else {
                        counters.record_discarded();
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("increment task");
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.processed, 2_000);
        assert_eq!(snapshot.discarded, 2_000);
        assert_eq!(snapshot.settled(), 4_000);
    }
}
