//! Two-phase stop: flip the worker's stop flag, then meet it at a two-party
//! barrier once it has finalized its context.

use std::time::Duration;

use crate::error::ShutdownError;

use super::{pool::WorkerHandle, report::WorkerSummary};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ShutdownCoordinator {
    timeout: Option<Duration>,
}

impl ShutdownCoordinator {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Stop every worker in index order. Workers that fail the exchange are
    /// returned separately; their summaries are lost.
    pub(crate) async fn stop_all(
        &self,
        handles: Vec<WorkerHandle>,
    ) -> (Vec<WorkerSummary>, Vec<usize>) {
        let mut summaries = Vec::with_capacity(handles.len());
        let mut lost = Vec::new();
        for handle in handles {
            let worker = handle.index;
            match self.stop(handle).await {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    tracing::error!(target: "ledgerload::shutdown", worker, error = %err, "stop rendezvous failed");
                    lost.push(worker);
                }
            }
        }
        (summaries, lost)
    }

    pub(crate) async fn stop(
        &self,
        mut handle: WorkerHandle,
    ) -> Result<WorkerSummary, ShutdownError> {
        let worker = handle.index;
        handle.handshake.stop.cancel();
        tracing::debug!(target: "ledgerload::shutdown", worker, "stop flag raised");

        let rendezvous = async {
            tokio::select! {
                biased;
                _ = handle.handshake.rendezvous.wait() => Ok(()),
                joined = &mut handle.task => Err(joined),
            }
        };

        let outcome = match self.timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, rendezvous).await;
                let Ok(outcome) = timed else {
                    handle.task.abort();
                    return Err(ShutdownError::TimedOut {
                        worker,
                        timeout: limit,
                    });
                };
                outcome
            }
            None => rendezvous.await,
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = (&mut handle.task).await {
                    tracing::warn!(target: "ledgerload::shutdown", worker, error = %err, "worker task failed after rendezvous");
                }
            }
            Err(joined) => {
                let reason = match joined {
                    Ok(()) => "exited without reaching the barrier".to_string(),
                    Err(err) => err.to_string(),
                };
                return Err(ShutdownError::TaskLost { worker, reason });
            }
        }

        handle
            .handshake
            .summary
            .lock()
            .await
            .take()
            .ok_or_else(|| ShutdownError::TaskLost {
                worker,
                reason: "no summary published".to_string(),
            })
    }
}
