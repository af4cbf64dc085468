use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evreq_sync::SyncOutcome;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "evreq-cli")]
#[command(about = "Event request reconciliation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single reconciliation pass over every enabled feed.
    Sync,
    /// Print a digest of the most recent sync runs.
    Report {
        /// How many runs to include, newest first.
        #[arg(long, default_value_t = 3)]
        runs: usize,
    },
    /// Stay resident and run passes on the configured cron schedule.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => match evreq_sync::run_sync_once_from_env().await? {
            SyncOutcome::Completed(summary) => println!(
                "sync complete: run_id={} feeds={} rows={} created={} updated={} reports={}",
                summary.run_id,
                summary.enabled_feeds,
                summary.fetched_rows,
                summary.created,
                summary.updated,
                summary.reports_dir
            ),
            SyncOutcome::Skipped => println!("sync skipped: another pass is still in flight"),
        },
        Commands::Report { runs } => {
            let digest = evreq_sync::report_recent_markdown(runs, None)?;
            println!("{digest}");
        }
        Commands::Watch => {
            let service = Arc::new(evreq_sync::service_from_env());
            let Some(scheduler) = service.maybe_build_scheduler().await? else {
                println!("scheduler disabled; set EVREQ_SCHEDULER_ENABLED=1 to run on a schedule");
                return Ok(());
            };
            scheduler.start().await.context("starting scheduler")?;
            info!("scheduler running, waiting for ctrl-c");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("shutting down");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
