use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tasker_core::ShutdownPolicy;

/// Load drivers for the tasker scheduler.
///
/// Each driver submits `[].sum(v)` script tasks for v in 1, 10 and 100,
/// polls until every task is done, and checks the collected total.
#[derive(Parser, Debug)]
#[command(name = "tasker", about = "Drive the tasker scheduler with script tasks")]
pub struct CliArgs {
    /// Path to a TOML scheduler config
    #[arg(long, global = true, env = "TASKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Worker thread count (0 = available parallelism)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Shutdown policy: graceful or immediate
    #[arg(long, global = true)]
    pub shutdown_policy: Option<ShutdownPolicy>,

    /// Print the run summary as JSON instead of a log line
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// One client thread submits everything, then collects everything
    Sequential {
        /// Tasks per value
        #[arg(long, default_value = "10000")]
        tasks: usize,
    },
    /// One client thread per value
    Multithread {
        /// Tasks per value
        #[arg(long, default_value = "10000")]
        tasks: usize,
    },
    /// A pool of clients running many small batches per value
    Stress {
        /// Batches per value
        #[arg(long, default_value = "1000")]
        batches: usize,
        /// Tasks per batch
        #[arg(long, default_value = "10")]
        batch_size: usize,
        /// Client threads running batches
        #[arg(long, default_value = "4")]
        clients: usize,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Sequential { .. } => "sequential",
            Command::Multithread { .. } => "multithread",
            Command::Stress { .. } => "stress",
        }
    }

    /// Number of tasks submitted for each value.
    pub fn tasks_per_value(&self) -> usize {
        match self {
            Command::Sequential { tasks } | Command::Multithread { tasks } => *tasks,
            Command::Stress {
                batches,
                batch_size,
                ..
            } => batches * batch_size,
        }
    }
}
