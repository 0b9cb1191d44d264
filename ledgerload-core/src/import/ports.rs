//! Collaborator contracts consumed by the scheduler.
//!
//! The scheduler owns ordering, routing, and shutdown. Everything that
//! touches the backing store sits behind these traits.

use async_trait::async_trait;
use ledgerload_model::MutationRecord;

use crate::error::{ApplyFault, ContextError, Result};

/// Produces the ordered snapshot of pending records for one run.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn read_pending(&self) -> Result<Vec<MutationRecord>>;
}

/// Reports how many pending records share a record's logical key.
#[async_trait]
pub trait CardinalityOracle: Send + Sync {
    async fn count_pending(&self, record: &MutationRecord) -> Result<usize>;
}

/// Unit of transactional state owned by exactly one worker.
#[async_trait]
pub trait ExecutionContext: Send + 'static {
    /// Make pending work durable.
    async fn commit(&mut self) -> std::result::Result<(), ContextError>;

    /// Discard pending work. A context may become invalid afterwards.
    async fn abort(&mut self);

    fn is_valid(&self) -> bool;
}

/// Creates fresh execution contexts.
#[async_trait]
pub trait ContextProvider: Send + Sync + 'static {
    type Context: ExecutionContext;

    async fn new_context(&self) -> std::result::Result<Self::Context, ContextError>;
}

/// Result of applying one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Expected, non-fatal rejection (missing actor, unknown target, ...).
    BusinessFailure { reason: String },
}

impl ApplyOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ApplyOutcome::BusinessFailure {
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// Performs the domain mutation for one record inside a worker's context.
///
/// `Ok(BusinessFailure)` discards the record and keeps the worker running.
/// `Err(ApplyFault)` is unrecoverable and terminates the worker.
#[async_trait]
pub trait MutationApplier<C: ExecutionContext>: Send + Sync + 'static {
    async fn apply(
        &self,
        record: &MutationRecord,
        context: &mut C,
    ) -> std::result::Result<ApplyOutcome, ApplyFault>;
}
