//! # ledgerload core
//!
//! Applies a batch of pending import-ledger records to a backing store using
//! a fixed pool of workers.
//!
//! - [`import`]: the partitioned scheduler. Routing with per-key stickiness,
//!   bounded worker inboxes, two-phase stop, run counters and reports.
//! - [`store`]: in-memory collaborators (entity store, execution contexts,
//!   record applier, snapshot ledger) used by the CLI and the test suite.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ledgerload_core::import::{ImportScheduler, SchedulerConfig};
//! use ledgerload_core::store::{
//!     EntityStore, LedgerFile, MemoryContextProvider, RecordApplier,
//! };
//!
//! # async fn demo() -> ledgerload_core::Result<()> {
//! let file = LedgerFile::load("ledger.json").await?;
//! let store = Arc::new(EntityStore::new());
//! file.seed(&store).await;
//! let ledger = file.into_ledger()?;
//!
//! let scheduler = ImportScheduler::new(
//!     SchedulerConfig::with_workers(4),
//!     Arc::new(MemoryContextProvider::new(Arc::clone(&store))),
//!     Arc::new(RecordApplier::default()),
//! );
//! let report = scheduler.run(&ledger, &ledger).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
#![allow(missing_docs)]

pub mod error;
pub mod import;
pub mod store;

pub use error::{
    ApplyFault, ContextError, FatalWorkerError, ImportError, Result, RoutingError,
    ShutdownError,
};
