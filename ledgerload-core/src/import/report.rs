use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::counters::CounterSnapshot;

/// Controls how run-log events are surfaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    /// Keep event lines in memory so they can be attached to the report.
    pub capture: bool,
    /// Suppress per-record info events. Errors are always emitted.
    pub silent: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            capture: true,
            silent: false,
        }
    }
}

/// Event log owned by one worker (or by the driver in sequential mode).
#[derive(Debug)]
pub struct RunLog {
    label: String,
    options: LogOptions,
    lines: Vec<String>,
}

impl RunLog {
    pub fn new(label: impl Into<String>, options: LogOptions) -> Self {
        Self {
            label: label.into(),
            options,
            lines: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn event(&mut self, line: impl Into<String>) {
        let line = line.into();
        if !self.options.silent {
            tracing::info!(target: "ledgerload::worker", worker = %self.label, "{line}");
        }
        self.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!(target: "ledgerload::worker", worker = %self.label, "{line}");
        self.push(line);
    }

    fn push(&mut self, line: String) {
        if self.options.capture {
            self.lines.push(line);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_text(self) -> String {
        let mut text = String::new();
        for line in self.lines {
            text.push_str(&line);
            text.push('\n');
        }
        text
    }
}

/// Final state of one worker, handed to the driver at the stop rendezvous.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker: usize,
    pub handled: usize,
    pub abandoned: usize,
    /// Set when the worker stopped on an unrecoverable fault.
    pub fatal: Option<String>,
    pub log: String,
}

/// Outcome of one import run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub worker_count: usize,
    pub total: usize,
    pub processed: usize,
    pub discarded: usize,
    /// Records dropped from a stopped worker's inbox.
    pub abandoned: usize,
    /// Records the router could not size or enqueue.
    pub routing_failures: usize,
    /// Indices of workers that stopped on a fatal fault or never reached
    /// their stop rendezvous.
    pub terminated_workers: Vec<usize>,
    pub per_worker_logs: Vec<String>,
}

impl RunReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        worker_count: usize,
        total: usize,
        counters: CounterSnapshot,
        routing_failures: usize,
        workers: Vec<WorkerSummary>,
        lost_workers: Vec<usize>,
    ) -> Self {
        let mut terminated_workers: Vec<usize> = workers
            .iter()
            .filter(|summary| summary.fatal.is_some())
            .map(|summary| summary.worker)
            .chain(lost_workers)
            .collect();
        terminated_workers.sort_unstable();
        terminated_workers.dedup();

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            worker_count,
            total,
            processed: counters.processed,
            discarded: counters.discarded,
            abandoned: counters.abandoned,
            routing_failures,
            terminated_workers,
            per_worker_logs: workers.into_iter().map(|summary| summary.log).collect(),
        }
    }

    /// Records that never produced a processed/discarded outcome.
    pub fn unaccounted(&self) -> usize {
        self.total
            .saturating_sub(self.processed + self.discarded + self.abandoned + self.routing_failures)
    }

    pub fn elapsed(&self) -> std::time::Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn is_clean(&self) -> bool {
        self.discarded == 0
            && self.abandoned == 0
            && self.routing_failures == 0
            && self.terminated_workers.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rows done {} on a total of {}", self.processed, self.total)?;
        write!(f, "Rows discarded {} on a total of {}", self.discarded, self.total)?;
        if self.abandoned > 0 {
            write!(f, "\nRows abandoned {} on a total of {}", self.abandoned, self.total)?;
        }
        if self.routing_failures > 0 {
            write!(
                f,
                "\nRows not routed {} on a total of {}",
                self.routing_failures, self.total
            )?;
        }
        if !self.terminated_workers.is_empty() {
            write!(f, "\nTerminated workers: {:?}", self.terminated_workers)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(worker: usize, fatal: Option<&str>) -> WorkerSummary {
        WorkerSummary {
            worker,
            handled: 0,
            abandoned: 0,
            fatal: fatal.map(str::to_string),
            log: format!("worker {worker}\n"),
        }
    }

    #[test]
    fn display_matches_legacy_summary_lines() {
        let report = RunReport::assemble(
            Uuid::now_v7(),
            Utc::now(),
            2,
            10,
            CounterSnapshot {
                processed: 8,
                discarded: 2,
                abandoned: 0,
            },
            0,
            vec![summary(0, None), summary(1, None)],
            Vec::new(),
        );

        assert_eq!(
            report.to_string(),
            "Rows done 8 on a total of 10\nRows discarded 2 on a total of 10"
        );
        assert_eq!(report.unaccounted(), 0);
        assert!(!report.is_clean());
    }

    #[test]
    fn terminated_workers_merge_fatal_and_lost() {
        let report = RunReport::assemble(
            Uuid::now_v7(),
            Utc::now(),
            3,
            4,
            CounterSnapshot::default(),
            1,
            vec![summary(0, None), summary(2, Some("boom"))],
            vec![1, 2],
        );

        assert_eq!(report.terminated_workers, vec![1, 2]);
        assert_eq!(report.per_worker_logs.len(), 2);
        assert!(report.to_string().contains("Rows not routed 1 on a total of 4"));
    }

    #[test]
    fn silent_log_still_captures_lines() {
        let mut log = RunLog::new(
            "w0",
            LogOptions {
                capture: true,
                silent: true,
            },
        );
        log.event("--> Record: rec-1 ...");
        log.error("ID: 1 Record id: rec-1 imported: ERROR :missing actor");
        assert_eq!(log.lines().len(), 2);
        assert!(log.into_text().ends_with("ERROR :missing actor\n"));
    }
}
