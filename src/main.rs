//! NEAR DeFi Agent - guardrailed autonomous strategy execution
//!
//! # WARNING
//! - This agent signs transactions with real funds. Only deploy with
//!   capital you can afford to lose.
//! - Guardrails block actions before signing, but cannot undo anything
//!   already on chain.
//! - Periodic behavior (heartbeat, daily-report) is driven by an external
//!   scheduler; the process itself never loops.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::error;

// Use the library crate
use near_agent::cli::commands;
use near_agent::config::Config;
use near_agent::error::Error;

/// NEAR DeFi agent - guardrailed transaction execution
#[derive(Parser)]
#[command(name = "near-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all token balances
    Balance,

    /// Show active DeFi positions
    Positions,

    /// Full portfolio + yield report
    Report {
        /// Risk tolerance: low, medium, high
        #[arg(long)]
        risk: Option<String>,
    },

    /// Execute autonomous rebalancing
    Rebalance {
        /// Must be 'AUTONOMOUS'
        #[arg(long)]
        confirm: String,

        /// Risk tolerance: low, medium, high
        #[arg(long)]
        risk: Option<String>,
    },

    /// Unwind all positions back to NEAR and halt trading
    EmergencyExit {
        /// Must be 'YES'
        #[arg(long)]
        confirm: String,
    },

    /// Periodic strategy heartbeat (cron)
    Heartbeat {
        /// Risk tolerance: low, medium, high
        #[arg(long)]
        risk: Option<String>,
    },

    /// Daily P&L report (cron)
    DailyReport,

    /// Mint a NEP-413 bearer auth token
    Auth {
        /// Output only the base64 bearer string
        #[arg(long)]
        bearer: bool,

        /// Message to sign
        #[arg(long)]
        message: Option<String>,

        /// Recipient the signature is bound to
        #[arg(long)]
        recipient: Option<String>,
    },

    /// Generate a new implicit account credential file
    GenerateWallet {
        /// Output path (defaults to the configured account file)
        #[arg(long)]
        output: Option<String>,
    },

    /// Halt all trading
    Halt {
        /// Reason recorded in the halt marker
        reason: String,
    },

    /// Resume trading (clears the halt marker)
    Resume,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("near_agent=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Balance => commands::balance(&config).await,
        Commands::Positions => commands::positions(&config).await,
        Commands::Report { risk } => commands::report(&config, risk.as_deref()).await,
        Commands::Rebalance { confirm, risk } => {
            commands::rebalance(&config, &confirm, risk.as_deref()).await
        }
        Commands::EmergencyExit { confirm } => commands::emergency_exit(&config, &confirm).await,
        Commands::Heartbeat { risk } => commands::heartbeat(&config, risk.as_deref()).await,
        Commands::DailyReport => commands::daily_report(&config).await,
        Commands::Auth {
            bearer,
            message,
            recipient,
        } => commands::auth(&config, bearer, message.as_deref(), recipient.as_deref()).await,
        Commands::GenerateWallet { output } => {
            commands::generate_wallet(&config, output.as_deref())
        }
        Commands::Halt { reason } => commands::halt(&config, &reason).await,
        Commands::Resume => commands::resume(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        // A guardrail rejection is a structured outcome, not a crash
        if let Some(Error::Guardrail(violation)) = e.downcast_ref::<Error>() {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "guardrail_violation",
                    "rule": violation.rule.as_str(),
                    "message": violation.message,
                }))?
            );
        } else {
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "error",
                    "message": e.to_string(),
                }))?
            );
        }
        std::process::exit(1);
    }

    Ok(())
}
