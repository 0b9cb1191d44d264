//! Post-run notification hooks.
//!
//! A failing notifier never fails the run; [`notify_all`] logs and moves on.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

use super::report::RunReport;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunNotifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Emits the run summary as a structured log event.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier {
    recipients: Vec<String>,
}

impl TracingNotifier {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl RunNotifier for TracingNotifier {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn notify(&self, report: &RunReport) -> Result<()> {
        tracing::info!(
            target: "ledgerload::summary",
            run = %report.run_id,
            recipients = ?self.recipients,
            processed = report.processed,
            discarded = report.discarded,
            total = report.total,
            "{}",
            report
        );
        for (worker, log) in report.per_worker_logs.iter().enumerate() {
            tracing::debug!(target: "ledgerload::summary", worker, lines = log.lines().count(), "worker log attached");
        }
        Ok(())
    }
}

/// Writes the full report as pretty JSON.
#[derive(Debug, Clone)]
pub struct JsonReportNotifier {
    path: PathBuf,
}

impl JsonReportNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RunNotifier for JsonReportNotifier {
    fn name(&self) -> &'static str {
        "json-report"
    }

    async fn notify(&self, report: &RunReport) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&self.path, payload).await?;
        tracing::info!(target: "ledgerload::summary", path = %self.path.display(), "run report written");
        Ok(())
    }
}

/// Run every notifier, logging failures. Returns how many succeeded.
pub async fn notify_all(notifiers: &[Box<dyn RunNotifier>], report: &RunReport) -> usize {
    let mut delivered = 0;
    for notifier in notifiers {
        match notifier.notify(report).await {
            Ok(()) => delivered += 1,
            Err(err) => {
                tracing::warn!(target: "ledgerload::summary", notifier = notifier.name(), error = %err, "run notification failed");
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::import::counters::CounterSnapshot;
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> RunReport {
        RunReport::assemble(
            Uuid::now_v7(),
            Utc::now(),
            1,
            3,
            CounterSnapshot {
                processed: 3,
                discarded: 0,
                abandoned: 0,
            },
            0,
            Vec::new(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn failing_notifier_does_not_stop_the_rest() {
        let mut failing = MockRunNotifier::new();
        failing.expect_name().return_const("broken");
        failing
            .expect_notify()
            .times(1)
            .returning(|_| Err(ImportError::Internal("smtp down".into())));

        let mut working = MockRunNotifier::new();
        working.expect_name().return_const("ok");
        working.expect_notify().times(1).returning(|_| Ok(()));

        let notifiers: Vec<Box<dyn RunNotifier>> = vec![Box::new(failing), Box::new(working)];
        assert_eq!(notify_all(&notifiers, &report()).await, 1);
    }

    #[tokio::test]
    async fn json_report_lands_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let report = report();

        JsonReportNotifier::new(&path).notify(&report).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }
}
