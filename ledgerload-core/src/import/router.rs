//! Partition routing: assigns every ledger record to exactly one worker.
//!
//! Keys that appear more than once in the pending set are pinned to the
//! worker that received their first record, so per-key order survives the
//! fan-out. Everything else is spread round robin.

use std::collections::HashMap;

use ledgerload_model::{LogicalKey, MutationRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::RoutingError;

use super::ports::CardinalityOracle;

/// `logical_key -> worker` for keys with more than one pending record.
///
/// Append-only and written exclusively by the [`PartitionRouter`] that owns
/// it.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    assignments: HashMap<LogicalKey, usize>,
}

impl RoutingTable {
    pub fn get(&self, key: &LogicalKey) -> Option<usize> {
        self.assignments.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LogicalKey, usize)> {
        self.assignments.iter().map(|(key, worker)| (key, *worker))
    }

    fn pin(&mut self, key: LogicalKey, worker: usize) {
        self.assignments.entry(key).or_insert(worker);
    }
}

/// How a worker was chosen for a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Only pending record for its key.
    Single,
    /// First record of a repeated key; the key is now pinned.
    Pinned,
    /// Later record of a repeated key; reused the pinned worker.
    Sticky,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub worker: usize,
    pub kind: RouteKind,
}

/// One row of a routing preview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub sequence_id: u64,
    pub logical_key: LogicalKey,
    pub cardinality: usize,
    pub assignment: Assignment,
}

/// Counts produced by one dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: usize,
    pub routing_failures: usize,
}

#[derive(Debug)]
pub struct PartitionRouter {
    worker_count: usize,
    cursor: usize,
    table: RoutingTable,
}

impl PartitionRouter {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            cursor: 0,
            table: RoutingTable::default(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Decide the worker for one record given how many pending records share
    /// its key. The round-robin cursor only moves on non-sticky decisions.
    pub fn assign(&mut self, key: &LogicalKey, cardinality: usize) -> Assignment {
        if cardinality > 1
            && let Some(worker) = self.table.get(key)
        {
            return Assignment {
                worker,
                kind: RouteKind::Sticky,
            };
        }

        let worker = self.cursor;
        self.cursor += 1;
        if self.cursor >= self.worker_count {
            self.cursor = 0;
        }

        if cardinality > 1 {
            self.table.pin(key.clone(), worker);
            Assignment {
                worker,
                kind: RouteKind::Pinned,
            }
        } else {
            Assignment {
                worker,
                kind: RouteKind::Single,
            }
        }
    }

    /// Route every record without enqueueing anything.
    pub async fn plan<O>(
        &mut self,
        records: &[MutationRecord],
        oracle: &O,
    ) -> (Vec<PlannedRoute>, Vec<RoutingError>)
    where
        O: CardinalityOracle + ?Sized,
    {
        let mut routes = Vec::with_capacity(records.len());
        let mut failures = Vec::new();
        for record in records {
            match self.size(record, oracle).await {
                Ok(cardinality) => {
                    let assignment = self.assign(&record.logical_key, cardinality);
                    routes.push(PlannedRoute {
                        sequence_id: record.sequence_id,
                        logical_key: record.logical_key.clone(),
                        cardinality,
                        assignment,
                    });
                }
                Err(err) => failures.push(err),
            }
        }
        (routes, failures)
    }

    /// Route and enqueue every record in scan order.
    ///
    /// `send` waits while the target inbox is full. A record that cannot be
    /// sized or enqueued is logged and skipped. The inbox senders are dropped
    /// on return.
    pub async fn dispatch<O>(
        &mut self,
        records: Vec<MutationRecord>,
        oracle: &O,
        inboxes: Vec<mpsc::Sender<MutationRecord>>,
    ) -> DispatchStats
    where
        O: CardinalityOracle + ?Sized,
    {
        let mut stats = DispatchStats::default();
        for record in records {
            let cardinality = match self.size(&record, oracle).await {
                Ok(cardinality) => cardinality,
                Err(err) => {
                    tracing::warn!(target: "ledgerload::router", error = %err, sequence_id = record.sequence_id, "skipping record");
                    stats.routing_failures += 1;
                    continue;
                }
            };

            let assignment = self.assign(&record.logical_key, cardinality);
            let sequence_id = record.sequence_id;
            tracing::debug!(
                target: "ledgerload::router",
                sequence_id,
                key = %record.logical_key,
                worker = assignment.worker,
                kind = ?assignment.kind,
                cardinality,
                "routing record"
            );

            let Some(inbox) = inboxes.get(assignment.worker) else {
                stats.routing_failures += 1;
                continue;
            };
            if inbox.send(record).await.is_err() {
                let err = RoutingError::InboxClosed {
                    worker: assignment.worker,
                    sequence_id,
                };
                tracing::warn!(target: "ledgerload::router", error = %err, "skipping record");
                stats.routing_failures += 1;
                continue;
            }
            stats.dispatched += 1;
        }

        tracing::info!(
            target: "ledgerload::router",
            dispatched = stats.dispatched,
            failures = stats.routing_failures,
            pinned_keys = self.table.len(),
            "dispatch complete"
        );
        stats
    }

    async fn size<O>(
        &self,
        record: &MutationRecord,
        oracle: &O,
    ) -> Result<usize, RoutingError>
    where
        O: CardinalityOracle + ?Sized,
    {
        oracle
            .count_pending(record)
            .await
            .map_err(|err| RoutingError::Cardinality {
                key: record.logical_key.to_string(),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{ImportError, Result};
    use async_trait::async_trait;
    use ledgerload_model::Operation;

    fn key(raw: &str) -> LogicalKey {
        LogicalKey::new(raw).unwrap()
    }

    struct CountingOracle(HashMap<String, usize>);

    #[async_trait]
    impl CardinalityOracle for CountingOracle {
        async fn count_pending(&self, record: &MutationRecord) -> Result<usize> {
            self.0
                .get(record.logical_key.as_str())
                .copied()
                .ok_or_else(|| ImportError::Ledger("unknown key".into()))
        }
    }

    #[test]
    fn sticky_keys_do_not_advance_cursor() {
        let mut router = PartitionRouter::new(3);

        let a = router.assign(&key("rec-42"), 3);
        assert_eq!(a, Assignment { worker: 0, kind: RouteKind::Pinned });

        let d = router.assign(&key("rec-7"), 1);
        assert_eq!(d.worker, 1);

        let b = router.assign(&key("rec-42"), 3);
        assert_eq!(b, Assignment { worker: 0, kind: RouteKind::Sticky });

        let e = router.assign(&key("rec-9"), 1);
        assert_eq!(e.worker, 2);

        let c = router.assign(&key("rec-42"), 3);
        assert_eq!(c.worker, 0);

        // wraps
        assert_eq!(router.assign(&key("rec-10"), 1).worker, 0);
        assert_eq!(router.table().len(), 1);
    }

    #[test]
    fn single_worker_routes_everything_to_zero() {
        let mut router = PartitionRouter::new(0);
        for n in 0..5 {
            assert_eq!(router.assign(&key(&format!("k{n}")), 1).worker, 0);
        }
    }

    #[tokio::test]
    async fn plan_reports_cardinality_failures() {
        let records = vec![
            MutationRecord::new(1, key("a"), Operation::Add),
            MutationRecord::new(2, key("missing"), Operation::Add),
            MutationRecord::new(3, key("a"), Operation::Update),
        ];
        let oracle = CountingOracle(HashMap::from([("a".to_string(), 2)]));

        let mut router = PartitionRouter::new(2);
        let (routes, failures) = router.plan(&records, &oracle).await;

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].assignment.worker, routes[1].assignment.worker);
        assert_eq!(routes[1].assignment.kind, RouteKind::Sticky);
        assert!(matches!(
            failures.as_slice(),
            [RoutingError::Cardinality { key, .. }] if key == "missing"
        ));
    }

    #[tokio::test]
    async fn dispatch_counts_closed_inboxes_as_failures() {
        let records = vec![
            MutationRecord::new(1, key("x"), Operation::Add),
            MutationRecord::new(2, key("y"), Operation::Add),
        ];
        let oracle = CountingOracle(HashMap::from([
            ("x".to_string(), 1),
            ("y".to_string(), 1),
        ]));

        let (open_tx, mut open_rx) = mpsc::channel(4);
        let (closed_tx, closed_rx) = mpsc::channel(4);
        drop(closed_rx);

        let mut router = PartitionRouter::new(2);
        let stats = router
            .dispatch(records, &oracle, vec![open_tx, closed_tx])
            .await;

        assert_eq!(stats, DispatchStats { dispatched: 1, routing_failures: 1 });
        assert_eq!(open_rx.recv().await.map(|r| r.sequence_id), Some(1));
        assert!(open_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn full_inbox_blocks_dispatch_until_a_slot_frees() {
        let records: Vec<MutationRecord> = (1..=3)
            .map(|seq| MutationRecord::new(seq, key(&format!("k{seq}")), Operation::Add))
            .collect();
        let oracle = CountingOracle(HashMap::from([
            ("k1".to_string(), 1),
            ("k2".to_string(), 1),
            ("k3".to_string(), 1),
        ]));
        let (tx, mut rx) = mpsc::channel(1);

        let mut router = PartitionRouter::new(1);
        let dispatch = router.dispatch(records, &oracle, vec![tx]);
        tokio::pin!(dispatch);

        // record 1 fills the only slot; record 2 waits on send
        let pending = tokio::time::timeout(Duration::from_millis(50), &mut dispatch).await;
        assert!(pending.is_err(), "dispatch finished with a full inbox");
        assert_eq!(rx.try_recv().map(|r| r.sequence_id).ok(), Some(1));

        // one freed slot lets exactly one more record through
        let pending = tokio::time::timeout(Duration::from_millis(50), &mut dispatch).await;
        assert!(pending.is_err(), "dispatch skipped past a full inbox");
        assert_eq!(rx.try_recv().map(|r| r.sequence_id).ok(), Some(2));
        assert!(rx.try_recv().is_err());

        let stats = dispatch.await;
        assert_eq!(stats, DispatchStats { dispatched: 3, routing_failures: 0 });
        assert_eq!(rx.recv().await.map(|r| r.sequence_id), Some(3));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dispatch_skips_records_it_cannot_size() {
        let records = vec![
            MutationRecord::new(1, key("a"), Operation::Add),
            MutationRecord::new(2, key("missing"), Operation::Add),
            MutationRecord::new(3, key("a"), Operation::Update),
            MutationRecord::new(4, key("b"), Operation::Add),
        ];
        let oracle = CountingOracle(HashMap::from([
            ("a".to_string(), 2),
            ("b".to_string(), 1),
        ]));
        let (tx, mut rx) = mpsc::channel(8);

        let mut router = PartitionRouter::new(1);
        let stats = router.dispatch(records, &oracle, vec![tx]).await;

        assert_eq!(stats, DispatchStats { dispatched: 3, routing_failures: 1 });
        let mut delivered = Vec::new();
        while let Some(record) = rx.recv().await {
            delivered.push(record.sequence_id);
        }
        assert_eq!(delivered, vec![1, 3, 4]);
    }
}
