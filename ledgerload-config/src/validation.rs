use std::time::Duration;

use thiserror::Error;

use crate::models::ImportConfig;

/// Worker counts above this multiple of the CPU count draw a warning.
pub const WORKERS_PER_CPU_WARN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("scheduler.inbox_capacity must be at least 1")]
    ZeroInboxCapacity,
    #[error("scheduler.{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn emit(&self) {
        for warning in &self.items {
            match &warning.hint {
                Some(hint) => tracing::warn!(hint = %hint, "{}", warning.message),
                None => tracing::warn!("{}", warning.message),
            }
        }
    }
}

/// Reject unusable settings and normalize the legacy ones, collecting
/// warnings for anything suspicious.
pub fn apply_guard_rails(
    config: &mut ImportConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    apply_guard_rails_for_cpus(config, num_cpus::get())
}

pub fn apply_guard_rails_for_cpus(
    config: &mut ImportConfig,
    cpus: usize,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let scheduler = &mut config.scheduler;

    if scheduler.inbox_capacity == Some(0) {
        return Err(ConfigGuardRailError::ZeroInboxCapacity);
    }
    if scheduler.poll_interval == Duration::ZERO {
        return Err(ConfigGuardRailError::ZeroDuration {
            field: "poll_interval",
        });
    }
    if scheduler.apply_timeout == Some(Duration::ZERO) {
        return Err(ConfigGuardRailError::ZeroDuration {
            field: "apply_timeout",
        });
    }
    if scheduler.shutdown_timeout == Some(Duration::ZERO) {
        return Err(ConfigGuardRailError::ZeroDuration {
            field: "shutdown_timeout",
        });
    }

    if scheduler.worker_count == 0 {
        scheduler.worker_count = 1;
        warnings.push_with_hint(
            "scheduler.worker_count is 0; running sequentially with one worker",
            "Set worker_count to 2 or more to enable the worker pool",
        );
    }

    let ceiling = cpus.max(1) * WORKERS_PER_CPU_WARN;
    if scheduler.worker_count > ceiling {
        warnings.push_with_hint(
            format!(
                "scheduler.worker_count {} exceeds {}x the {} available CPUs",
                scheduler.worker_count, WORKERS_PER_CPU_WARN, cpus
            ),
            "Workers mostly contend on the store beyond this point",
        );
    }

    if let Some(capacity) = scheduler.inbox_capacity
        && capacity < scheduler.worker_count
        && scheduler.worker_count > 1
    {
        warnings.push(format!(
            "scheduler.inbox_capacity {capacity} is below the worker count; the ledger reader will stall often"
        ));
    }

    if config.apply.invert_metadata_clean && config.apply.metadata_clean.is_empty() {
        warnings.push_with_hint(
            "apply.invert_metadata_clean has no effect without apply.metadata_clean",
            "List the fields to keep in apply.metadata_clean",
        );
    }

    if config.notify.enabled
        && config.notify.report_path.is_none()
        && config.notify.recipients.is_empty()
    {
        warnings.push(
            "notify.enabled is set but neither report_path nor recipients are configured; the summary is only logged",
        );
    }

    Ok(warnings)
}
