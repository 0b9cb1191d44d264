use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inbox slots per worker when no explicit capacity is configured.
pub const DEFAULT_INBOX_SLOTS_PER_WORKER: usize = 3;

/// What a worker does with records still queued when it observes the stop
/// flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Keep dequeuing until the inbox is empty, then stop.
    #[default]
    Drain,
    /// Stop at the next loop check. Records left in the inbox are abandoned
    /// and reported as such.
    Immediate,
}

/// Knobs for one scheduler run.
///
/// All fields carry defaults so partially specified configuration files keep
/// working as new settings appear.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of workers. `1` runs every record inline on the driver with a
    /// single context and skips routing entirely.
    pub worker_count: usize,
    /// Bounded inbox size per worker; defaults to `worker_count * 3`.
    pub inbox_capacity: Option<usize>,
    /// Upper bound (ms) a worker blocks on an empty inbox before re-checking
    /// its stop flag.
    pub poll_interval_ms: u64,
    /// Whether a stopping worker drains its inbox first.
    pub shutdown_policy: ShutdownPolicy,
    /// Optional per-record apply deadline (ms). Unset means an apply call may
    /// run indefinitely.
    pub apply_timeout_ms: Option<u64>,
    /// Optional bound (ms) on the stop rendezvous with each worker.
    pub shutdown_timeout_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            inbox_capacity: None,
            poll_interval_ms: 1_000,
            shutdown_policy: ShutdownPolicy::Drain,
            apply_timeout_ms: None,
            shutdown_timeout_ms: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    /// Worker count with the legacy `0` ("not configured") folded into the
    /// sequential path.
    pub fn effective_workers(&self) -> usize {
        self.worker_count.max(1)
    }

    pub fn effective_inbox_capacity(&self) -> usize {
        self.inbox_capacity
            .unwrap_or(self.effective_workers() * DEFAULT_INBOX_SLOTS_PER_WORKER)
            .max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn apply_timeout(&self) -> Option<Duration> {
        self.apply_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    pub fn is_sequential(&self) -> bool {
        self.effective_workers() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_capacity_scales_with_workers_by_default() {
        let config = SchedulerConfig::with_workers(4);
        assert_eq!(config.effective_inbox_capacity(), 12);

        let explicit = SchedulerConfig {
            inbox_capacity: Some(1),
            ..SchedulerConfig::with_workers(4)
        };
        assert_eq!(explicit.effective_inbox_capacity(), 1);
    }

    #[test]
    fn zero_workers_runs_sequentially() {
        let config = SchedulerConfig::with_workers(0);
        assert!(config.is_sequential());
        assert_eq!(config.effective_inbox_capacity(), 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"worker_count": 6}"#).unwrap();
        assert_eq!(config.worker_count, 6);
        assert_eq!(config.poll_interval_ms, 1_000);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
    }
}
