//! Ghostgate CLI - operator tooling for forensic ledgers
//!
//! - Verify the hash chain of a JSONL ledger
//! - Export compliance reports
//! - Run a scripted gate session to see the hold-to-confirm flow end to end
//! - Inspect the effective configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;
mod output;

use commands::{demo, export, verify};
use config::CliConfig;
use output::OutputFormat;

/// Ghostgate CLI application
#[derive(Parser)]
#[command(name = "ghostgate")]
#[command(about = "Ghostgate - hold-to-confirm authorization CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "GHOSTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Verify the hash chain of a JSONL ledger
    Verify {
        /// Ledger file
        ledger: PathBuf,
    },

    /// Export a compliance report from a JSONL ledger
    Export {
        /// Ledger file
        ledger: PathBuf,

        /// First sequence number to include
        #[arg(long)]
        from: Option<u64>,

        /// Last sequence number to include
        #[arg(long)]
        to: Option<u64>,
    },

    /// Run a scripted gate session against an echo bridge
    Demo(demo::DemoArgs),

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = CliConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Verify { ledger } => verify::execute(&ledger, cli.output)
            .with_context(|| format!("verifying {}", ledger.display()))?,
        Commands::Export { ledger, from, to } => export::execute(&ledger, from, to, cli.output)
            .with_context(|| format!("exporting {}", ledger.display()))?,
        Commands::Demo(args) => demo::execute(args, &config, cli.output)
            .await
            .context("running demo session")?,
        Commands::Config => match cli.output {
            OutputFormat::Table => print!("{}", config.to_toml()?),
            OutputFormat::Json => output::print_json(&config)?,
        },
    }
    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().without_time().with_writer(std::io::stderr))
            .init();
    }
}
