mod cli;
mod config;
mod driver;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use tasker_scheduler::TaskScheduler;

use crate::cli::CliArgs;

fn main() -> Result<()> {
    config::load_dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = config::resolve(args.config.as_deref(), args.workers, args.shutdown_policy)
        .context("failed to load configuration")?;
    config.log_summary();

    let scheduler =
        Arc::new(TaskScheduler::new(config).context("failed to start task scheduler")?);

    // Shut down even if the driver failed, then report.
    let outcome = driver::run(&scheduler, &args.command);
    scheduler
        .shutdown()
        .context("failed to shut down task scheduler")?;
    let summary = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            "{} driver finished in {} ms: total {} (expected {}), {} tasks, {} failed",
            summary.driver,
            summary.elapsed_ms,
            summary.total,
            summary.expected,
            summary.tasks,
            summary.metrics.failed
        );
    }

    if !summary.is_correct() {
        error!(
            "Total mismatch: got {}, expected {}",
            summary.total, summary.expected
        );
        bail!("{} driver computed the wrong total", summary.driver);
    }
    Ok(())
}
