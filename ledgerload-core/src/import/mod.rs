//! Partitioned worker-pool scheduler for import ledgers.
//!
//! ```text
//! LedgerReader -> PartitionRouter -> WorkerPool -> MutationApplier
//!                                        |
//!                              ShutdownCoordinator / RunCounters
//! ```
//!
//! Records sharing a logical key are pinned to one worker, so each key is
//! applied in ledger order while unrelated keys proceed in parallel.

pub mod config;
pub mod counters;
pub mod notify;
pub mod ports;
pub mod report;
pub mod router;
pub mod runner;

pub(crate) mod pool;
pub(crate) mod shutdown;
pub(crate) mod worker;

pub use config::{DEFAULT_INBOX_SLOTS_PER_WORKER, SchedulerConfig, ShutdownPolicy};
pub use counters::{CounterSnapshot, RunCounters};
pub use notify::{JsonReportNotifier, RunNotifier, TracingNotifier, notify_all};
pub use ports::{
    ApplyOutcome, CardinalityOracle, ContextProvider, ExecutionContext, LedgerReader,
    MutationApplier,
};
pub use report::{LogOptions, RunLog, RunReport, WorkerSummary};
pub use router::{Assignment, DispatchStats, PartitionRouter, PlannedRoute, RouteKind, RoutingTable};
pub use runner::ImportScheduler;
