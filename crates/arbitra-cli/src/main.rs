//! Arbitra CLI - Arbiter-governed escrow from the command line
//!
//! Every command prints JSON on stdout; logs go to stderr.
//!
//! # Quick Start
//!
//! ```bash
//! arbitra create --from 0xd0.. --arbiter 0xa0.. --beneficiary 0xb0.. --amount 1.5
//! arbitra approve-arbiter --from 0xa0.. --index 0
//! arbitra approve --from 0xb0.. --index 0
//! arbitra list
//! arbitra verify
//!
//! # Walk through both lifecycles against a throwaway ledger
//! arbitra demo
//! ```
//!
//! Denied requests exit with status 2, unknown indices with 3, malformed
//! input with 4 and anything else with 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use arbitra_types::{EscrowError, Operation};

use crate::config::{CliConfig, LoggingConfig, StorageBackend};

/// Arbitra - trustless arbiter escrow
#[derive(Parser, Debug)]
#[command(name = "arbitra")]
#[command(author = "Arbitra Contributors")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, global = true, env = "ARBITRA_CONFIG")]
    config: Option<String>,

    /// Journal backend
    #[arg(long, global = true, value_enum)]
    backend: Option<StorageBackend>,

    /// Directory of the sled journal
    #[arg(long, global = true, env = "ARBITRA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ARBITRA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, global = true, env = "ARBITRA_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deposit funds into a new agreement
    Create {
        /// Depositor address
        #[arg(long)]
        from: String,

        /// Arbiter address
        #[arg(long)]
        arbiter: String,

        /// Beneficiary address
        #[arg(long)]
        beneficiary: String,

        /// Amount as a decimal in whole units
        #[arg(long)]
        amount: String,

        /// Decimal places of the currency
        #[arg(long, default_value = "18")]
        decimals: u8,
    },

    /// Approve an agreement as its arbiter
    ApproveArbiter(TransitionArgs),

    /// Finalize an arbiter-approved agreement and release the funds
    Approve(TransitionArgs),

    /// Reject an agreement as its arbiter
    Dismiss(TransitionArgs),

    /// Retire a finalized agreement
    Delete(TransitionArgs),

    /// List all agreements in creation order
    List {
        /// Show the operations this address could request
        #[arg(long)]
        caller: Option<String>,
    },

    /// Print the journal
    History,

    /// Verify the journal hash chain and replay it
    Verify,

    /// Run both lifecycles against an in-memory ledger
    Demo,
}

#[derive(clap::Args, Debug)]
struct TransitionArgs {
    /// Caller address
    #[arg(long)]
    from: String,

    /// Agreement index
    #[arg(long)]
    index: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<EscrowError>() {
                Some(escrow) => {
                    commands::print_error(escrow);
                    match escrow {
                        EscrowError::Denied { .. } => 2,
                        EscrowError::NotFound { .. } => 3,
                        EscrowError::SerializationFault { .. } => 4,
                        _ => 1,
                    }
                }
                None => {
                    eprintln!("error: {e:#}");
                    1
                }
            };
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cli_config = CliConfig::load(cli.config.as_deref())?;

    if let Some(backend) = cli.backend {
        cli_config.storage.backend = backend;
    }
    if let Some(data_dir) = cli.data_dir {
        cli_config.storage.data_dir = data_dir;
    }
    if let Some(level) = cli.log_level {
        cli_config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        cli_config.logging.format = format;
    }

    init_logging(&cli_config.logging)?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?cli_config.storage.backend,
        "Starting arbitra"
    );

    match cli.command {
        Commands::Create {
            from,
            arbiter,
            beneficiary,
            amount,
            decimals,
        } => {
            commands::agreement::create(&cli_config, &from, &arbiter, &beneficiary, &amount, decimals)
                .await
        }
        Commands::ApproveArbiter(args) => {
            commands::agreement::transition(&cli_config, Operation::ApproveAsArbiter, &args.from, args.index)
                .await
        }
        Commands::Approve(args) => {
            commands::agreement::transition(&cli_config, Operation::ApproveEscrow, &args.from, args.index)
                .await
        }
        Commands::Dismiss(args) => {
            commands::agreement::transition(&cli_config, Operation::Dismiss, &args.from, args.index).await
        }
        Commands::Delete(args) => {
            commands::agreement::transition(&cli_config, Operation::Delete, &args.from, args.index).await
        }
        Commands::List { caller } => commands::agreement::list(&cli_config, caller.as_deref()).await,
        Commands::History => commands::journal::history(&cli_config).await,
        Commands::Verify => commands::journal::verify(&cli_config).await,
        Commands::Demo => commands::demo::run(&cli_config).await,
    }
}

/// Initialize tracing/logging on stderr
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
