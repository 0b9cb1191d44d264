//! Worker side of the scheduler: record processing and the inbox loop.

use std::{any::Any, fmt, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use ledgerload_model::MutationRecord;
use tokio::sync::{Barrier, Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{ContextError, FatalWorkerError};

use super::{
    config::ShutdownPolicy,
    counters::RunCounters,
    ports::{ApplyOutcome, ContextProvider, ExecutionContext, MutationApplier},
    report::{RunLog, WorkerSummary},
};

/// Applies records inside one exclusively owned execution context.
///
/// Shared by pool workers and by the inline sequential path so both produce
/// identical counter updates and log lines.
pub(crate) struct RecordProcessor<P, A>
where
    P: ContextProvider,
{
    provider: Arc<P>,
    applier: Arc<A>,
    counters: Arc<RunCounters>,
    apply_timeout: Option<Duration>,
    context: Option<P::Context>,
}

impl<P, A> fmt::Debug for RecordProcessor<P, A>
where
    P: ContextProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordProcessor")
            .field("apply_timeout", &self.apply_timeout)
            .field(
                "context_valid",
                &self.context.as_ref().map(ExecutionContext::is_valid),
            )
            .finish()
    }
}

impl<P, A> RecordProcessor<P, A>
where
    P: ContextProvider,
    A: MutationApplier<P::Context>,
{
    pub(crate) fn new(
        provider: Arc<P>,
        applier: Arc<A>,
        counters: Arc<RunCounters>,
        apply_timeout: Option<Duration>,
    ) -> Self {
        Self {
            provider,
            applier,
            counters,
            apply_timeout,
            context: None,
        }
    }

    /// Apply one record, committing or aborting the context and bumping the
    /// matching counter. Returns an error only for faults that must stop the
    /// caller. Panics raised by the applier or context are caught here.
    pub(crate) async fn process(
        &mut self,
        record: &MutationRecord,
        log: &mut RunLog,
    ) -> Result<(), FatalWorkerError> {
        log.event(format!("--> Record: {} ...", record.logical_key));
        let result = AssertUnwindSafe(self.process_inner(record, log))
            .catch_unwind()
            .await;
        match result {
            Ok(result) => result,
            Err(payload) => {
                self.context = None;
                Err(FatalWorkerError::Panicked(panic_message(payload.as_ref())))
            }
        }
    }

    async fn process_inner(
        &mut self,
        record: &MutationRecord,
        log: &mut RunLog,
    ) -> Result<(), FatalWorkerError> {
        let context = ensure_context(self.provider.as_ref(), &mut self.context)
            .await
            .map_err(FatalWorkerError::Context)?;

        let applied = match self.apply_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.applier.apply(record, context)).await {
                    Ok(result) => result,
                    Err(_) => Ok(ApplyOutcome::rejected(format!(
                        "apply exceeded {}",
                        humantime::format_duration(limit)
                    ))),
                }
            }
            None => self.applier.apply(record, context).await,
        };
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(fault) => {
                // staged writes of the faulting record must never reach finalize
                if context.is_valid() {
                    context.abort().await;
                }
                self.context = None;
                return Err(FatalWorkerError::Apply(fault));
            }
        };

        let outcome = match outcome {
            ApplyOutcome::Applied => match context.commit().await {
                Ok(()) => ApplyOutcome::Applied,
                Err(err) => ApplyOutcome::rejected(err.to_string()),
            },
            rejected => rejected,
        };

        match outcome {
            ApplyOutcome::Applied => {
                self.counters.record_processed();
                log.event(format!(
                    "ID: {} Record id: {} imported: OK",
                    record.sequence_id, record.logical_key
                ));
            }
            ApplyOutcome::BusinessFailure { reason } => {
                if context.is_valid() {
                    context.abort().await;
                }
                self.counters.record_discarded();
                log.error(format!(
                    "ID: {} Record id: {} imported: ERROR :{}",
                    record.sequence_id, record.logical_key, reason
                ));
            }
        }
        Ok(())
    }

    /// Commit any open context before the worker leaves.
    pub(crate) async fn finalize(&mut self, log: &mut RunLog) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        if !context.is_valid() {
            return;
        }
        if let Err(err) = context.commit().await {
            log.error(format!("final commit failed: {err}"));
        }
    }
}

async fn ensure_context<'a, P>(
    provider: &P,
    slot: &'a mut Option<P::Context>,
) -> Result<&'a mut P::Context, ContextError>
where
    P: ContextProvider,
{
    let context = match slot.take() {
        Some(context) if context.is_valid() => context,
        Some(_) => {
            tracing::debug!(target: "ledgerload::worker", "recreating invalid execution context");
            provider.new_context().await?
        }
        None => provider.new_context().await?,
    };
    Ok(slot.insert(context))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Cooperative stop signal and two-party rendezvous shared by a worker and
/// the driver.
#[derive(Debug, Clone)]
pub(crate) struct StopHandshake {
    pub(crate) stop: CancellationToken,
    pub(crate) rendezvous: Arc<Barrier>,
    pub(crate) summary: Arc<Mutex<Option<WorkerSummary>>>,
}

impl StopHandshake {
    pub(crate) fn new() -> Self {
        Self {
            stop: CancellationToken::new(),
            rendezvous: Arc::new(Barrier::new(2)),
            summary: Arc::new(Mutex::new(None)),
        }
    }
}

/// A pool member: bounded inbox, stop flag, and its own record processor.
pub(crate) struct Worker<P, A>
where
    P: ContextProvider,
{
    index: usize,
    inbox: mpsc::Receiver<MutationRecord>,
    handshake: StopHandshake,
    policy: ShutdownPolicy,
    poll_interval: Duration,
    processor: RecordProcessor<P, A>,
    counters: Arc<RunCounters>,
    log: RunLog,
    handled: usize,
}

impl<P, A> fmt::Debug for Worker<P, A>
where
    P: ContextProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("policy", &self.policy)
            .field("poll_interval", &self.poll_interval)
            .field("stopping", &self.handshake.stop.is_cancelled())
            .field("handled", &self.handled)
            .finish()
    }
}

impl<P, A> Worker<P, A>
where
    P: ContextProvider,
    A: MutationApplier<P::Context>,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: usize,
        inbox: mpsc::Receiver<MutationRecord>,
        handshake: StopHandshake,
        policy: ShutdownPolicy,
        poll_interval: Duration,
        processor: RecordProcessor<P, A>,
        counters: Arc<RunCounters>,
        log: RunLog,
    ) -> Self {
        Self {
            index,
            inbox,
            handshake,
            policy,
            poll_interval,
            processor,
            counters,
            log,
            handled: 0,
        }
    }

    /// Task body: process until stopped, finalize, publish the summary, then
    /// meet the driver at the barrier.
    pub(crate) async fn run(mut self) {
        let fatal = self.run_loop().await.err();
        if let Some(err) = &fatal {
            self.log.error(format!("worker terminated: {err}"));
            tracing::error!(target: "ledgerload::worker", worker = self.index, error = %err, "worker terminated on fatal fault");
        }

        let abandoned = self.abandon_queued();
        self.processor.finalize(&mut self.log).await;

        let handshake = self.handshake.clone();
        let summary = WorkerSummary {
            worker: self.index,
            handled: self.handled,
            abandoned,
            fatal: fatal.map(|err| err.to_string()),
            log: self.log.into_text(),
        };
        *handshake.summary.lock().await = Some(summary);
        handshake.rendezvous.wait().await;
    }

    async fn run_loop(&mut self) -> Result<(), FatalWorkerError> {
        loop {
            if self.handshake.stop.is_cancelled() {
                if self.policy == ShutdownPolicy::Drain {
                    while let Ok(record) = self.inbox.try_recv() {
                        self.handle(record).await?;
                    }
                }
                return Ok(());
            }

            match tokio::time::timeout(self.poll_interval, self.inbox.recv()).await {
                Ok(Some(record)) => self.handle(record).await?,
                // every sender is gone and the inbox is empty
                Ok(None) => return Ok(()),
                Err(_) => continue,
            }
        }
    }

    async fn handle(&mut self, record: MutationRecord) -> Result<(), FatalWorkerError> {
        self.handled += 1;
        self.processor.process(&record, &mut self.log).await
    }

    /// Close the inbox and drop whatever is still queued.
    fn abandon_queued(&mut self) -> usize {
        self.inbox.close();
        let mut abandoned = 0;
        while let Ok(record) = self.inbox.try_recv() {
            abandoned += 1;
            self.counters.record_abandoned();
            self.log.error(format!(
                "ID: {} Record id: {} abandoned: worker stopped",
                record.sequence_id, record.logical_key
            ));
        }
        if abandoned > 0 {
            tracing::warn!(target: "ledgerload::worker", worker = self.index, abandoned, "records left in inbox at stop");
        }
        abandoned
    }
}
