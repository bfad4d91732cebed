//! CLI command implementations
//!
//! Every command emits exactly one structured JSON outcome document on
//! stdout. Secrets never appear in any output.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::strategy::orchestrator::Orchestrator;
use crate::wallet::keys::Credentials;
use crate::wallet::nep413::{self, NEARAI_MESSAGE, NEARAI_RECIPIENT};

fn output<T: Serialize>(command: &str, body: &T) -> Result<()> {
    let mut value = serde_json::to_value(body)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("command".into(), json!(command));
        map.entry("status").or_insert(json!("ok"));
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn orchestrator(config: &Config) -> crate::error::Result<Orchestrator> {
    let credentials = Credentials::load(Path::new(&config.state.account_file))?;
    Orchestrator::new(config.clone(), credentials)
}

/// Show all token balances
pub async fn balance(config: &Config) -> Result<()> {
    let agent = orchestrator(config)?;
    let snapshot = agent.balance_report().await?;
    output("balance", &snapshot)
}

/// Show active DeFi positions
pub async fn positions(config: &Config) -> Result<()> {
    let agent = orchestrator(config)?;
    let positions = agent.positions_report().await?;
    output("positions", &positions)
}

/// Full portfolio + yield comparison report
pub async fn report(config: &Config, risk: Option<&str>) -> Result<()> {
    let agent = orchestrator(config)?;
    let risk = agent.risk_tolerance(risk);
    let report = agent.full_report(risk).await?;
    output("report", &report)
}

/// Execute autonomous portfolio rebalancing
pub async fn rebalance(config: &Config, confirm: &str, risk: Option<&str>) -> Result<()> {
    if confirm != "AUTONOMOUS" {
        anyhow::bail!("Rebalance requires --confirm AUTONOMOUS");
    }

    let agent = orchestrator(config)?;
    let risk = agent.risk_tolerance(risk);
    info!(risk = ?risk, "Starting rebalance");
    let summary = agent.run_rebalance(risk).await?;
    output("rebalance", &summary)
}

/// Unwind all DeFi positions back to native NEAR
pub async fn emergency_exit(config: &Config, confirm: &str) -> Result<()> {
    if confirm != "YES" {
        anyhow::bail!("Emergency exit requires --confirm YES");
    }

    let agent = orchestrator(config)?;
    info!("Starting emergency exit");
    let summary = agent.run_emergency_exit().await?;
    output("emergency-exit", &summary)
}

/// Periodic strategy heartbeat for cron execution
pub async fn heartbeat(config: &Config, risk: Option<&str>) -> Result<()> {
    let agent = orchestrator(config)?;
    let risk = agent.risk_tolerance(risk);
    let summary = agent.run_heartbeat(risk).await?;
    output("heartbeat", &summary)
}

/// Daily P&L and portfolio summary for scheduled delivery
pub async fn daily_report(config: &Config) -> Result<()> {
    let agent = orchestrator(config)?;
    let report = agent.daily_report().await?;
    output("daily-report", &report)
}

/// Mint a NEP-413 bearer auth token
pub async fn auth(
    config: &Config,
    bearer_only: bool,
    message: Option<&str>,
    recipient: Option<&str>,
) -> Result<()> {
    let credentials = Credentials::load(Path::new(&config.state.account_file))?;
    let token = nep413::generate_auth_token(
        &credentials,
        message.unwrap_or(NEARAI_MESSAGE),
        recipient.unwrap_or(NEARAI_RECIPIENT),
        None,
    )?;

    let bearer = token.to_bearer()?;
    if bearer_only {
        println!("{}", bearer);
        return Ok(());
    }

    output(
        "auth",
        &json!({
            "account_id": token.account_id.clone(),
            "token": token,
            "bearer": bearer,
        }),
    )
}

/// Generate a new implicit account and write its credential file.
/// The private key never reaches stdout.
pub fn generate_wallet(config: &Config, output_path: Option<&str>) -> Result<()> {
    let path = output_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from(&config.state.account_file));

    let account = crate::wallet::keys::generate_implicit_account();
    crate::wallet::keys::write_account_file(&account, &path)?;

    output(
        "generate-wallet",
        &json!({
            "account_id": account.account_id.clone(),
            "public_key": account.public_key.clone(),
            "file": path.display().to_string(),
            "next_step": format!("Fund this account by sending NEAR to {}", account.account_id),
        }),
    )
}

/// Halt all trading (operator action)
pub async fn halt(config: &Config, reason: &str) -> Result<()> {
    let agent = orchestrator(config)?;
    agent.guardrails().halt_trading(reason)?;
    output("halt", &json!({ "trading_halted": true, "reason": reason }))
}

/// Resume trading by clearing the halt marker (operator action)
pub async fn resume(config: &Config) -> Result<()> {
    let agent = orchestrator(config)?;
    agent.guardrails().resume_trading()?;
    output("resume", &json!({ "trading_halted": false }))
}

/// Show current configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
