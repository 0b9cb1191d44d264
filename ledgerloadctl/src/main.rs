//! `ledgerloadctl`: apply or preview a pending import ledger.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledgerload_config::ConfigLoad;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{plan::PlanArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(name = "ledgerloadctl", version)]
#[command(about = "Apply pending import-ledger records with a partitioned worker pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every pending record of a ledger file
    Run(RunArgs),
    /// Show which worker each pending record would be routed to
    Plan(PlanArgs),
}

impl Command {
    fn load_config(&self) -> Result<ConfigLoad> {
        match self {
            Command::Run(args) => cli::load_config(args.config.as_deref(), args.overrides()),
            Command::Plan(args) => cli::load_config(args.config.as_deref(), args.overrides()),
        }
    }

    fn silent(&self) -> bool {
        matches!(self, Command::Run(args) if args.silent)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loaded before the subscriber so `.env` can set RUST_LOG.
    let load = cli.command.load_config()?;
    init_tracing(cli.command.silent());

    if load.env_file_loaded {
        info!("loaded .env file");
    }
    info!(source = %load.source, "configuration loaded");
    load.warnings.emit();

    match cli.command {
        Command::Run(args) => cli::run::execute(args, load.config).await,
        Command::Plan(args) => cli::plan::execute(args, load.config).await,
    }
}

fn init_tracing(silent: bool) {
    let default_filter = if silent {
        "warn"
    } else {
        "info,ledgerload::worker=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
