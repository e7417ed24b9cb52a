use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walletbook::app::{config_output, Walletbook};
use walletbook::config::{default_config_path, ResolvedConfig};
use walletbook::error::LedgerError;
use walletbook::models::{CurrencyCode, OwnerId};

#[derive(Parser)]
#[command(name = "walletbook")]
#[command(about = "Custodial multi-currency wallet ledger")]
struct Cli {
    /// Path to config file (defaults to ./walletbook.toml, then the XDG data dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add funds to a wallet, creating it on first use
    Deposit {
        #[arg(long)]
        owner: String,
        currency: String,
        amount: Decimal,
    },

    /// Remove funds from an existing wallet
    Withdraw {
        #[arg(long)]
        owner: String,
        currency: String,
        amount: Decimal,
    },

    /// Value every non-empty wallet in the reference currency
    Portfolio {
        #[arg(long)]
        owner: String,
    },

    /// List wallets, including empty ones
    Wallets {
        #[arg(long)]
        owner: String,
    },

    /// Show transaction history, newest first
    History {
        #[arg(long)]
        owner: String,

        /// Maximum number of transactions (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Drop cached prices so the next lookup hits the feed
    ClearPriceCache,

    /// Show current configuration
    Config,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
    config.apply_env_overrides()?;

    if let Command::Config = cli.command {
        return print_json(&config_output(&config_path, &config));
    }

    let app = Walletbook::open(&config).await?;
    match cli.command {
        Command::Deposit {
            owner,
            currency,
            amount,
        } => {
            let receipt = app
                .ledger
                .deposit(&OwnerId::new(owner), &CurrencyCode::new(currency), amount)
                .await?;
            print_json(&receipt)
        }
        Command::Withdraw {
            owner,
            currency,
            amount,
        } => {
            let receipt = app
                .ledger
                .withdraw(&OwnerId::new(owner), &CurrencyCode::new(currency), amount)
                .await?;
            print_json(&receipt)
        }
        Command::Portfolio { owner } => {
            let snapshot = app.portfolio.portfolio(&OwnerId::new(owner)).await?;
            print_json(&snapshot)
        }
        Command::Wallets { owner } => {
            let wallets = app.ledger.wallets(&OwnerId::new(owner)).await?;
            print_json(&wallets)
        }
        Command::History {
            owner,
            limit,
            offset,
        } => {
            let history = app
                .ledger
                .history(&OwnerId::new(owner), limit, offset)
                .await?;
            print_json(&history)
        }
        Command::ClearPriceCache => {
            app.prices.price_cache().clear().await?;
            print_json(&serde_json::json!({ "cleared": true }))
        }
        Command::Config => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            // Rejected requests are distinguishable from internal failures.
            let rejected = err
                .downcast_ref::<LedgerError>()
                .is_some_and(LedgerError::is_user_facing);
            if rejected {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
