use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Args;
use ledgerload_config::{ConfigOverrides, ImportConfig, NotifySettings};
use ledgerload_core::{
    import::{
        ImportScheduler, JsonReportNotifier, LogOptions, RunNotifier, ShutdownPolicy,
        TracingNotifier, notify_all,
    },
    store::{EntityStore, MemoryContextProvider, RecordApplier},
};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Ledger file (JSON) holding the store seed and the pending records
    #[arg(short, long, env = "LEDGERLOAD_LEDGER")]
    pub ledger: PathBuf,

    /// Worker count; 1 applies every record inline (overrides config)
    #[arg(short, long, env = "LEDGERLOAD_THREADS")]
    pub threads: Option<usize>,

    /// Bounded inbox size per worker (overrides config)
    #[arg(long)]
    pub inbox_capacity: Option<usize>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub silent: bool,

    /// Skip search-index updates on commit
    #[arg(long)]
    pub no_index: bool,

    /// Do not send the run summary to the configured recipients
    #[arg(long)]
    pub no_notify: bool,

    /// Account the batch runs as (defaults to the first batchjob@ account)
    #[arg(short = 'u', long)]
    pub batch_user: Option<String>,

    /// Metadata field cleared before an update writes; repeatable, a
    /// trailing `.*` matches every qualifier
    #[arg(short = 'm', long = "metadata-clean", value_name = "FIELD")]
    pub metadata_clean: Vec<String>,

    /// Clear every field except the ones given with -m
    #[arg(long)]
    pub switch: bool,

    /// Replace bitstreams on update instead of appending
    #[arg(long)]
    pub delete_bitstreams: bool,

    /// Write the JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Finish queued records before stopping (default)
    #[arg(long, conflicts_with = "immediate")]
    pub drain: bool,

    /// Abandon queued records as soon as stop is signalled
    #[arg(long)]
    pub immediate: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        let shutdown_policy = if self.immediate {
            Some(ShutdownPolicy::Immediate)
        } else if self.drain {
            Some(ShutdownPolicy::Drain)
        } else {
            None
        };
        ConfigOverrides {
            worker_count: self.threads,
            inbox_capacity: self.inbox_capacity,
            shutdown_policy,
            batch_user: self.batch_user.clone(),
            metadata_clean: self.metadata_clean.clone(),
            invert_metadata_clean: self.switch,
            delete_bitstreams: self.delete_bitstreams,
            disable_index: self.no_index,
            disable_notify: self.no_notify,
            report_path: self.report.clone(),
        }
    }
}

pub async fn execute(args: RunArgs, config: ImportConfig) -> Result<()> {
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let file = super::read_ledger(&args.ledger).await?;
    let store = Arc::new(EntityStore::new());
    file.seed(&store).await;
    let ledger = super::snapshot(file)?;

    let mut applier = RecordApplier::new(config.apply_options());
    let batch_user = config.apply.batch_user.as_deref();
    match (store.batch_actor(batch_user).await, batch_user) {
        (Some(actor), _) => {
            info!(actor = %actor.email, "batch account resolved");
            applier = applier.with_batch_actor(actor);
        }
        (None, Some(email)) => bail!("batch user {email} is not a known account"),
        (None, None) => warn!("no batchjob@ account in the ledger; provenance is not stamped"),
    }

    let mut provider = MemoryContextProvider::new(Arc::clone(&store));
    if !config.apply.index {
        provider = provider.without_index();
    }

    let scheduler_config = config.scheduler_config();
    info!(
        workers = scheduler_config.effective_workers(),
        inbox_capacity = scheduler_config.effective_inbox_capacity(),
        poll_interval = %humantime::format_duration(scheduler_config.poll_interval()),
        shutdown_policy = ?scheduler_config.shutdown_policy,
        pending = ledger.len(),
        "scheduler configuration in effect"
    );

    let log_options = LogOptions {
        capture: config.notify.enabled || config.notify.report_path.is_some(),
        silent: args.silent,
    };
    let scheduler = ImportScheduler::new(scheduler_config, Arc::new(provider), Arc::new(applier))
        .with_log_options(log_options);
    let report = scheduler
        .run(&ledger, &ledger)
        .await
        .context("import run failed")?;

    println!("{report}");

    info!(
        entities = store.len().await,
        commits = store.commit_count().await,
        indexed = store.indexed().await.len(),
        "store state after run"
    );

    let notifiers = notifiers(&config.notify);
    if !notifiers.is_empty() {
        notify_all(&notifiers, &report).await;
    }

    if !report.is_clean() {
        warn!(
            discarded = report.discarded,
            abandoned = report.abandoned,
            routing_failures = report.routing_failures,
            terminated = ?report.terminated_workers,
            "import run finished with problems"
        );
    }
    Ok(())
}

fn notifiers(settings: &NotifySettings) -> Vec<Box<dyn RunNotifier>> {
    let mut notifiers: Vec<Box<dyn RunNotifier>> = Vec::new();
    if settings.enabled {
        notifiers.push(Box::new(TracingNotifier::new(settings.recipients.clone())));
    }
    if let Some(path) = &settings.report_path {
        notifiers.push(Box::new(JsonReportNotifier::new(path)));
    }
    notifiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn flags_map_onto_overrides() {
        let harness = Harness::try_parse_from([
            "ledgerloadctl",
            "--ledger",
            "ledger.json",
            "-t",
            "4",
            "-m",
            "dc.title",
            "-m",
            "dc.contributor.*",
            "--switch",
            "--immediate",
            "--no-index",
        ])
        .unwrap();

        let overrides = harness.run.overrides();
        assert_eq!(overrides.worker_count, Some(4));
        assert_eq!(overrides.metadata_clean, vec!["dc.title", "dc.contributor.*"]);
        assert!(overrides.invert_metadata_clean);
        assert_eq!(overrides.shutdown_policy, Some(ShutdownPolicy::Immediate));
        assert!(overrides.disable_index);
        assert!(!overrides.disable_notify);
    }

    #[test]
    fn drain_and_immediate_conflict() {
        let err = Harness::try_parse_from([
            "ledgerloadctl",
            "--ledger",
            "ledger.json",
            "--drain",
            "--immediate",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn report_path_alone_still_writes_json() {
        let settings = NotifySettings {
            enabled: false,
            report_path: Some(PathBuf::from("out/report.json")),
            recipients: Vec::new(),
        };
        let names: Vec<&str> = notifiers(&settings).iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["json-report"]);
    }
}
