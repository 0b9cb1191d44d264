use std::{path::PathBuf, time::Duration};

use ledgerload_core::{
    import::{SchedulerConfig, ShutdownPolicy},
    store::ApplyOptions,
};
use serde::{Deserialize, Serialize};

/// Everything an import run can be tuned with. Each section tolerates
/// missing keys so a config file only needs the values it changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub scheduler: SchedulerSettings,
    pub apply: ApplySettings,
    pub notify: NotifySettings,
}

/// Worker-pool tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Number of workers. `1` applies every record inline; `0` is accepted
    /// for compatibility and treated as `1`.
    pub worker_count: usize,
    /// Bounded inbox per worker. Defaults to three slots per worker. Lower
    /// values make the reader wait on slow workers sooner.
    pub inbox_capacity: Option<usize>,
    /// How long an idle worker blocks on its inbox before re-checking the
    /// stop flag.
    #[serde(with = "crate::duration")]
    pub poll_interval: Duration,
    /// `drain` finishes queued records on stop; `immediate` abandons them.
    pub shutdown_policy: ShutdownPolicy,
    /// Per-record apply deadline. Records exceeding it are discarded.
    #[serde(with = "crate::duration::option", skip_serializing_if = "Option::is_none")]
    pub apply_timeout: Option<Duration>,
    /// Bound on each worker's stop rendezvous.
    #[serde(with = "crate::duration::option", skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout: Option<Duration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            worker_count: 1,
            inbox_capacity: None,
            poll_interval: Duration::from_secs(1),
            shutdown_policy: ShutdownPolicy::Drain,
            apply_timeout: None,
            shutdown_timeout: None,
        }
    }
}

/// Record semantics for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySettings {
    /// Account the batch runs as. Falls back to the first `batchjob@`
    /// account when unset.
    pub batch_user: Option<String>,
    /// Fields cleared before an update writes. Empty clears every field.
    pub metadata_clean: Vec<String>,
    /// Clear everything except `metadata_clean`.
    pub invert_metadata_clean: bool,
    /// Replace bitstreams on update instead of appending.
    pub delete_bitstreams: bool,
    /// Push committed entities to the search index.
    pub index: bool,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            batch_user: None,
            metadata_clean: Vec::new(),
            invert_metadata_clean: false,
            delete_bitstreams: false,
            index: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub enabled: bool,
    /// Where the JSON run report is written.
    pub report_path: Option<PathBuf>,
    pub recipients: Vec<String>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            report_path: None,
            recipients: Vec::new(),
        }
    }
}

impl ImportConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let scheduler = &self.scheduler;
        SchedulerConfig {
            worker_count: scheduler.worker_count.max(1),
            inbox_capacity: scheduler.inbox_capacity,
            poll_interval_ms: duration_ms(scheduler.poll_interval),
            shutdown_policy: scheduler.shutdown_policy,
            apply_timeout_ms: scheduler.apply_timeout.map(duration_ms),
            shutdown_timeout_ms: scheduler.shutdown_timeout.map(duration_ms),
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            metadata_clean: self.apply.metadata_clean.clone(),
            invert_metadata_clean: self.apply.invert_metadata_clean,
            delete_bitstreams: self.apply.delete_bitstreams,
        }
    }

    /// Render as TOML, e.g. for `--print-config`.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Values supplied on the command line. They win over every file or
/// environment source.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub worker_count: Option<usize>,
    pub inbox_capacity: Option<usize>,
    pub shutdown_policy: Option<ShutdownPolicy>,
    pub batch_user: Option<String>,
    /// Replaces the configured list when non-empty.
    pub metadata_clean: Vec<String>,
    pub invert_metadata_clean: bool,
    pub delete_bitstreams: bool,
    pub disable_index: bool,
    pub disable_notify: bool,
    pub report_path: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ImportConfig) {
        if let Some(workers) = self.worker_count {
            config.scheduler.worker_count = workers;
        }
        if let Some(capacity) = self.inbox_capacity {
            config.scheduler.inbox_capacity = Some(capacity);
        }
        if let Some(policy) = self.shutdown_policy {
            config.scheduler.shutdown_policy = policy;
        }
        if let Some(user) = &self.batch_user {
            config.apply.batch_user = Some(user.clone());
        }
        if !self.metadata_clean.is_empty() {
            config.apply.metadata_clean = self.metadata_clean.clone();
        }
        config.apply.invert_metadata_clean |= self.invert_metadata_clean;
        config.apply.delete_bitstreams |= self.delete_bitstreams;
        if self.disable_index {
            config.apply.index = false;
        }
        if self.disable_notify {
            config.notify.enabled = false;
        }
        if let Some(path) = &self.report_path {
            config.notify.report_path = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_durations_use_humantime() {
        let config: ImportConfig = toml::from_str(
            r#"
            [scheduler]
            worker_count = 4
            poll_interval = "250ms"
            apply_timeout = "30s"
            shutdown_policy = "immediate"
            "#,
        )
        .unwrap();

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.worker_count, 4);
        assert_eq!(scheduler.poll_interval_ms, 250);
        assert_eq!(scheduler.apply_timeout_ms, Some(30_000));
        assert_eq!(scheduler.shutdown_timeout_ms, None);
        assert_eq!(scheduler.shutdown_policy, ShutdownPolicy::Immediate);
        assert!(config.apply.index);
    }

    #[test]
    fn rendered_toml_parses_back() {
        let mut config = ImportConfig::default();
        config.scheduler.shutdown_timeout = Some(Duration::from_secs(90));
        config.apply.metadata_clean = vec!["dc.contributor.*".into()];

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("shutdown_timeout = \"1m 30s\""));
        let parsed: ImportConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = ImportConfig::default();
        config.apply.metadata_clean = vec!["dc.title".into()];

        ConfigOverrides {
            worker_count: Some(8),
            metadata_clean: vec!["dc.subject".into()],
            disable_index: true,
            ..ConfigOverrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.scheduler.worker_count, 8);
        assert_eq!(config.apply.metadata_clean, vec!["dc.subject".to_string()]);
        assert!(!config.apply.index);
        assert!(config.notify.enabled);
    }
}
