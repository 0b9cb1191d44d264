use std::time::Duration;

use thiserror::Error;

/// Run-level failures. These are the only errors that reach the caller of an
/// import run; per-record and per-worker failures are folded into the
/// [`RunReport`](crate::import::RunReport).
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ledger read failed: {0}")]
    Ledger(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] ledgerload_model::ModelError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Failure to route one record; the router logs it and moves on.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("cardinality lookup failed for key {key}: {reason}")]
    Cardinality { key: String, reason: String },

    #[error("worker {worker} inbox closed; record {sequence_id} not enqueued")]
    InboxClosed { worker: usize, sequence_id: u64 },
}

/// Unrecoverable fault that terminates the worker observing it.
#[derive(Error, Debug)]
pub enum FatalWorkerError {
    #[error("execution context unavailable: {0}")]
    Context(#[source] ContextError),

    #[error("applier fault: {0}")]
    Apply(#[source] ApplyFault),

    #[error("panic while applying record: {0}")]
    Panicked(String),
}

/// Failure of the stop/rendezvous exchange with one worker.
#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("worker {worker} did not reach the stop barrier within {timeout:?}")]
    TimedOut { worker: usize, timeout: Duration },

    #[error("worker {worker} task ended abnormally: {reason}")]
    TaskLost { worker: usize, reason: String },
}

/// Execution-context management failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("context is no longer valid")]
    Invalid,

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("context unavailable: {0}")]
    Unavailable(String),
}

/// An unrecoverable fault raised by a mutation applier. Returning one
/// terminates the worker that observed it.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ApplyFault {
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl ApplyFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
