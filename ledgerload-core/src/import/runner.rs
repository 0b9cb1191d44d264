use std::{fmt, sync::Arc};

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;

use super::{
    config::SchedulerConfig,
    counters::RunCounters,
    pool::WorkerPool,
    ports::{CardinalityOracle, ContextProvider, LedgerReader, MutationApplier},
    report::{LogOptions, RunLog, RunReport, WorkerSummary},
    router::PartitionRouter,
    shutdown::ShutdownCoordinator,
    worker::RecordProcessor,
};

/// Entry point for one import run.
///
/// Reads the pending snapshot once, fans it out over the worker pool (or
/// applies it inline when a single worker is configured), stops every
/// worker, and reports the settled counters.
pub struct ImportScheduler<P, A> {
    config: SchedulerConfig,
    provider: Arc<P>,
    applier: Arc<A>,
    log_options: LogOptions,
}

impl<P, A> fmt::Debug for ImportScheduler<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportScheduler")
            .field("config", &self.config)
            .field("provider", &std::any::type_name::<P>())
            .field("applier", &std::any::type_name::<A>())
            .field("log_options", &self.log_options)
            .finish()
    }
}

impl<P, A> ImportScheduler<P, A>
where
    P: ContextProvider,
    A: MutationApplier<P::Context>,
{
    pub fn new(config: SchedulerConfig, provider: Arc<P>, applier: Arc<A>) -> Self {
        Self {
            config,
            provider,
            applier,
            log_options: LogOptions::default(),
        }
    }

    pub fn with_log_options(mut self, log_options: LogOptions) -> Self {
        self.log_options = log_options;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn run<L, O>(&self, ledger: &L, oracle: &O) -> Result<RunReport>
    where
        L: LedgerReader + ?Sized,
        O: CardinalityOracle + ?Sized,
    {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let records = ledger.read_pending().await?;
        let total = records.len();
        let worker_count = self.config.effective_workers();
        let counters = Arc::new(RunCounters::new());

        tracing::info!(
            target: "ledgerload::summary",
            run = %run_id,
            total,
            workers = worker_count,
            "import run started"
        );

        let (routing_failures, workers, lost) = if self.config.is_sequential() {
            let summary = self.run_inline(records, &counters).await;
            (0, vec![summary], Vec::new())
        } else {
            self.run_partitioned(records, oracle, &counters).await
        };

        let report = RunReport::assemble(
            run_id,
            started_at,
            worker_count,
            total,
            counters.snapshot(),
            routing_failures,
            workers,
            lost,
        );

        tracing::info!(
            target: "ledgerload::summary",
            run = %run_id,
            processed = report.processed,
            discarded = report.discarded,
            abandoned = report.abandoned,
            routing_failures = report.routing_failures,
            total = report.total,
            elapsed = %humantime::format_duration(report.elapsed()),
            "import run finished"
        );
        Ok(report)
    }

    /// Single-worker mode: no router, no inboxes, no barrier. One context on
    /// the driver task handles every record in scan order.
    async fn run_inline(
        &self,
        records: Vec<ledgerload_model::MutationRecord>,
        counters: &Arc<RunCounters>,
    ) -> WorkerSummary {
        let mut processor = RecordProcessor::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.applier),
            Arc::clone(counters),
            self.config.apply_timeout(),
        );
        let mut log = RunLog::new("worker-0", self.log_options);
        let mut handled = 0;
        let mut fatal = None;

        let mut pending = records.into_iter();
        for record in pending.by_ref() {
            handled += 1;
            if let Err(err) = processor.process(&record, &mut log).await {
                log.error(format!("worker terminated: {err}"));
                tracing::error!(target: "ledgerload::worker", worker = 0, error = %err, "inline import stopped on fatal fault");
                fatal = Some(err.to_string());
                break;
            }
        }

        let mut abandoned = 0;
        for record in pending {
            abandoned += 1;
            counters.record_abandoned();
            log.error(format!(
                "ID: {} Record id: {} abandoned: worker stopped",
                record.sequence_id, record.logical_key
            ));
        }

        processor.finalize(&mut log).await;
        WorkerSummary {
            worker: 0,
            handled,
            abandoned,
            fatal,
            log: log.into_text(),
        }
    }

    async fn run_partitioned<O>(
        &self,
        records: Vec<ledgerload_model::MutationRecord>,
        oracle: &O,
        counters: &Arc<RunCounters>,
    ) -> (usize, Vec<WorkerSummary>, Vec<usize>)
    where
        O: CardinalityOracle + ?Sized,
    {
        let (pool, inboxes) = WorkerPool::spawn(
            &self.config,
            &self.provider,
            &self.applier,
            counters,
            self.log_options,
        );

        let mut router = PartitionRouter::new(pool.len());
        let stats = router.dispatch(records, oracle, inboxes).await;

        let coordinator = ShutdownCoordinator::new(self.config.shutdown_timeout());
        let (summaries, lost) = coordinator.stop_all(pool.into_handles()).await;
        (stats.routing_failures, summaries, lost)
    }
}
