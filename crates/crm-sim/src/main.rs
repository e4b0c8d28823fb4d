//! crm-sim — run the placement engine and executor offline.
//!
//! # Usage
//!
//! ```text
//! crm-sim plan --config cluster.toml --status status.toml
//! crm-sim run --config cluster.toml --status status.toml --fail 3
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "crm-sim",
    about = "Cluster resource manager simulator",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Input documents shared by every subcommand.
#[derive(Args)]
pub struct Inputs {
    /// Configuration document (.json or .toml)
    #[arg(short, long)]
    config: PathBuf,
    /// Status document (.json or .toml)
    #[arg(short, long)]
    status: PathBuf,
    /// Engine tuning (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    engine: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute placement and print the transition graph
    Plan {
        #[command(flatten)]
        inputs: Inputs,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Also print the allocated resource tree
        #[arg(long)]
        describe: bool,
    },
    /// Compute the graph and execute it against a simulated dispatcher.
    ///
    /// Every action is confirmed immediately except the ids given with
    /// --fail, which are reported as failed.
    Run {
        #[command(flatten)]
        inputs: Inputs,
        /// Action ids to fail
        #[arg(long, value_delimiter = ',')]
        fail: Vec<u32>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,crm_policy=debug,crm_transition=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            inputs,
            format,
            describe,
        } => commands::plan::plan(&inputs, &format, describe),
        Commands::Run { inputs, fail, format } => commands::run::run(&inputs, &fail, &format).await,
    }
}
