//! In-memory reference collaborators: entity store, transactional contexts,
//! record applier, and the snapshot ledger.

pub mod applier;
pub mod ledger;
pub mod memory;

pub use applier::{ApplyOptions, PROVENANCE_FIELD, RecordApplier};
pub use ledger::{LedgerFile, SnapshotLedger};
pub use memory::{Actor, EntityStore, ImportMapping, MemoryContext, MemoryContextProvider};
