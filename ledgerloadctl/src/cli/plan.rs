use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ledgerload_config::{ConfigOverrides, ImportConfig};
use ledgerload_core::import::{PartitionRouter, PlannedRoute, RouteKind};
use tracing::warn;

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Ledger file (JSON) holding the pending records
    #[arg(short, long, env = "LEDGERLOAD_LEDGER")]
    pub ledger: PathBuf,

    /// Worker count to plan for (overrides config)
    #[arg(short, long, env = "LEDGERLOAD_THREADS")]
    pub threads: Option<usize>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit the routes as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            worker_count: self.threads,
            ..ConfigOverrides::default()
        }
    }
}

pub async fn execute(args: PlanArgs, config: ImportConfig) -> Result<()> {
    let ledger = super::snapshot(super::read_ledger(&args.ledger).await?)?;
    let workers = config.scheduler_config().effective_workers();

    let mut router = PartitionRouter::new(workers);
    let (routes, failures) = router.plan(ledger.records(), &ledger).await;
    for failure in &failures {
        warn!(error = %failure, "record could not be routed");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
    } else {
        print!("{}", render_table(&routes, workers, router.table().len()));
    }
    Ok(())
}

fn route_label(kind: RouteKind) -> &'static str {
    match kind {
        RouteKind::Single => "single",
        RouteKind::Pinned => "pinned",
        RouteKind::Sticky => "sticky",
    }
}

fn render_table(routes: &[PlannedRoute], workers: usize, pinned_keys: usize) -> String {
    let mut out = format!(
        "{:>8}  {:<36}  {:>5}  {:>6}  {}\n",
        "SEQ", "KEY", "COUNT", "WORKER", "ROUTE"
    );
    let mut load = vec![0usize; workers];
    for route in routes {
        out.push_str(&format!(
            "{:>8}  {:<36}  {:>5}  {:>6}  {}\n",
            route.sequence_id,
            route.logical_key,
            route.cardinality,
            route.assignment.worker,
            route_label(route.assignment.kind)
        ));
        if let Some(slot) = load.get_mut(route.assignment.worker) {
            *slot += 1;
        }
    }
    out.push_str(&format!(
        "{} records over {} workers, {} pinned keys\n",
        routes.len(),
        workers,
        pinned_keys
    ));
    for (worker, count) in load.iter().enumerate() {
        out.push_str(&format!("  worker {worker}: {count} records\n"));
    }
    out
}
