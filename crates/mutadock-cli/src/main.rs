//! mutadock: mutation-aware docking with consensus scoring.
//! Entry point for the command-line binary.

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use commands::{compare::CompareArgs, dock::DockArgs, prepare::PrepareArgs};

#[derive(Parser, Debug)]
#[command(name = "mutadock", version, about = "Mutation-aware protein-ligand docking")]
struct Cli {
    /// Debug logging and full error chains
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Configuration file (default: ./mutadock.toml)
    #[arg(long, global = true, env = "MUTADOCK_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dock a ligand, optionally against a mutated and relaxed receptor.
    Dock(DockArgs),
    /// Mutate and/or convert a structure without docking.
    Prepare(PrepareArgs),
    /// Classify the affinity shift between a wild-type and a mutant result.
    Compare(CompareArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mutadock=debug,info"
    } else {
        "mutadock=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("mutadock {}", env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.verbose {
                eprintln!("error: {:?}", e);
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = config::Config::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Dock(args) => {
            info!("=== mutadock dock ===");
            commands::dock::run(args, &config).await
        }
        Command::Prepare(args) => commands::prepare::run(args, &config).await,
        Command::Compare(args) => commands::compare::run(args),
    }
}
