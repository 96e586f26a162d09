//! taskq - delayed and immediate task queue server.
//!
//! # Commands
//!
//! - `taskq run` - Run scheduler, workers and HTTP ingress
//! - `taskq enqueue <queue> <name>` - Add a task
//! - `taskq stats` - Show queue lengths
//! - `taskq promote` - Run one promotion pass

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use taskq_config::AppConfig;

mod commands;
mod ingress;
mod telemetry;

use commands::{enqueue, promote, run, stats};

/// Delayed and immediate task queue backed by Redis
#[derive(Parser)]
#[command(name = "taskq")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (.yaml, .yml, .toml or .json)
    #[arg(short, long, global = true, env = "TASKQ_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scheduler, workers and HTTP ingress until interrupted
    Run(RunArgs),

    /// Add a task to a queue
    Enqueue(EnqueueArgs),

    /// Show ready and scheduled counts for every queue
    Stats,

    /// Promote due scheduled tasks once
    Promote,
}

#[derive(Args)]
struct RunArgs {
    /// Listen address for the HTTP ingress
    #[arg(long)]
    listen: Option<String>,

    /// Do not start the HTTP ingress
    #[arg(long)]
    no_http: bool,
}

#[derive(Args)]
struct EnqueueArgs {
    /// Target queue
    queue: String,

    /// Task name
    name: String,

    /// Task id (random when omitted)
    #[arg(long)]
    id: Option<String>,

    /// JSON payload
    #[arg(long)]
    payload: Option<String>,

    /// Initial retry counter
    #[arg(long, default_value_t = 0)]
    retry: u32,

    /// Delay before the task becomes visible
    #[arg(long, default_value_t = 0)]
    delay_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(&telemetry::LogConfig::from_env())?;

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;

    match cli.command {
        Commands::Run(args) => {
            run::execute(
                &config,
                run::RunOptions {
                    listen: args.listen,
                    no_http: args.no_http,
                },
            )
            .await
        }
        Commands::Enqueue(args) => {
            enqueue::execute(
                &config,
                enqueue::EnqueueOptions {
                    queue: args.queue,
                    name: args.name,
                    id: args.id,
                    payload: args.payload,
                    retry: args.retry,
                    delay_secs: args.delay_secs,
                },
            )
            .await
        }
        Commands::Stats => stats::execute(&config).await,
        Commands::Promote => promote::execute(&config).await,
    }
}
