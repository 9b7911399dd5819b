//! Replay CLI
//!
//! Runs JSON test batches against the sample module and reports per-test
//! and batch verdicts.

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay generated tests against a registered implementation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test batch
    Run {
        /// Batch file (JSON)
        file: PathBuf,
        /// Configuration file (defaults to ./replay.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Exception matching: runtime-type or structural
        #[arg(long)]
        policy: Option<String>,
        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Check declared expected coverage after a passing batch
        #[arg(long)]
        coverage: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = commands::run::Reporter::Pretty)]
        reporter: commands::run::Reporter,
        /// Color output: auto, always, never
        #[arg(long, default_value = "auto")]
        color: String,
    },

    /// List the types and methods of the sample module
    Types {
        /// Color output: auto, always, never
        #[arg(long, default_value = "auto")]
        color: String,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "replay=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            policy,
            jobs,
            coverage,
            reporter,
            color,
        } => commands::run::execute(commands::run::RunArgs {
            file,
            config,
            policy,
            jobs,
            coverage,
            reporter,
            color,
        }),
        Commands::Types { color } => commands::types::execute(&color),
    }
}
