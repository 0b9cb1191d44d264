use std::sync::Arc;

use ledgerload_model::MutationRecord;
use tokio::{sync::mpsc, task::JoinHandle};

use super::{
    config::SchedulerConfig,
    counters::RunCounters,
    ports::{ContextProvider, MutationApplier},
    report::{LogOptions, RunLog},
    worker::{RecordProcessor, StopHandshake, Worker},
};

/// Driver-side handle to one running worker.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub(crate) index: usize,
    pub(crate) handshake: StopHandshake,
    pub(crate) task: JoinHandle<()>,
}

/// Fixed set of workers started once per run.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `config.effective_workers()` workers, returning the pool and the
    /// inbox senders in worker order.
    pub(crate) fn spawn<P, A>(
        config: &SchedulerConfig,
        provider: &Arc<P>,
        applier: &Arc<A>,
        counters: &Arc<RunCounters>,
        log_options: LogOptions,
    ) -> (Self, Vec<mpsc::Sender<MutationRecord>>)
    where
        P: ContextProvider,
        A: MutationApplier<P::Context>,
    {
        let worker_count = config.effective_workers();
        let capacity = config.effective_inbox_capacity();
        let mut workers = Vec::with_capacity(worker_count);
        let mut inboxes = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let (tx, rx) = mpsc::channel(capacity);
            let handshake = StopHandshake::new();
            let processor = RecordProcessor::new(
                Arc::clone(provider),
                Arc::clone(applier),
                Arc::clone(counters),
                config.apply_timeout(),
            );
            let worker = Worker::new(
                index,
                rx,
                handshake.clone(),
                config.shutdown_policy,
                config.poll_interval(),
                processor,
                Arc::clone(counters),
                RunLog::new(format!("worker-{index}"), log_options),
            );

            let task = tokio::spawn(worker.run());
            workers.push(WorkerHandle {
                index,
                handshake,
                task,
            });
            inboxes.push(tx);
        }

        tracing::info!(
            target: "ledgerload::worker",
            workers = worker_count,
            inbox_capacity = capacity,
            policy = ?config.shutdown_policy,
            "worker pool started"
        );
        (Self { workers }, inboxes)
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn into_handles(self) -> Vec<WorkerHandle> {
        self.workers
    }
}
