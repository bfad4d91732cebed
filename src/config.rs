//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
    /// Cache TTL for fetched prices
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// Guardrail thresholds. Loaded once per invocation, immutable after that.
///
/// These limits are enforced in code before any transaction is signed and
/// cannot be overridden by the strategy layer.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailConfig {
    /// Maximum USD value of a single transaction. Values at or above
    /// 1,000,000 disable the check (unrestricted operating mode).
    #[serde(default = "default_max_single_tx_usd")]
    pub max_single_tx_usd: f64,

    /// Daily loss limit as a percentage of the previous day's value.
    /// 100 or more disables the check.
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,

    /// Weekly loss limit against the earliest of the last 7 recorded values.
    #[serde(default = "default_weekly_loss_limit_pct")]
    pub weekly_loss_limit_pct: f64,

    /// Minimum native NEAR balance to keep liquid after any spend
    #[serde(default = "default_min_balance_floor_near")]
    pub min_balance_floor_near: f64,

    /// Maximum share of the portfolio a single asset may reach post-trade.
    /// 100 or more disables the check.
    #[serde(default = "default_max_concentration_pct")]
    pub max_concentration_pct: f64,

    /// Health factor below which borrowing is refused
    #[serde(default = "default_min_health_factor")]
    pub min_health_factor: f64,

    /// Health factor below which every leveraging action is refused
    #[serde(default = "default_emergency_health_factor")]
    pub emergency_health_factor: f64,

    /// Maximum tolerated slippage on swaps
    #[serde(default = "default_max_slippage_pct")]
    pub max_slippage_pct: f64,

    /// Maximum transactions per UTC day
    #[serde(default = "default_max_daily_txs")]
    pub max_daily_txs: u32,

    /// Marker file name inside the state dir; its presence halts trading
    #[serde(default = "default_halt_file")]
    pub halt_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Default risk tolerance: low, medium, high
    #[serde(default = "default_risk_tolerance")]
    pub risk_tolerance: String,

    /// NEAR kept back from every allocation for gas
    #[serde(default = "default_gas_reserve_near")]
    pub gas_reserve_near: f64,

    /// Heartbeat auto-executes recommendations only above this portfolio value
    #[serde(default = "default_min_auto_execute_usd")]
    pub min_auto_execute_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Directory for persisted guardrail and portfolio state
    #[serde(default = "default_state_dir")]
    pub dir: String,

    /// Account credential file (used when env vars are not set)
    #[serde(default = "default_account_file")]
    pub account_file: String,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("NEAR_RPC_ENDPOINT").unwrap_or_else(|_| "https://rpc.mainnet.near.org".into())
}

fn default_rpc_timeout_ms() -> u64 {
    15000
}

fn default_max_retries() -> u32 {
    3
}

fn default_price_api_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price".into()
}

fn default_price_timeout_ms() -> u64 {
    10000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_max_single_tx_usd() -> f64 {
    500.0
}

fn default_daily_loss_limit_pct() -> f64 {
    5.0
}

fn default_weekly_loss_limit_pct() -> f64 {
    10.0
}

fn default_min_balance_floor_near() -> f64 {
    2.0
}

fn default_max_concentration_pct() -> f64 {
    60.0
}

fn default_min_health_factor() -> f64 {
    1.5
}

fn default_emergency_health_factor() -> f64 {
    1.2
}

fn default_max_slippage_pct() -> f64 {
    2.0
}

fn default_max_daily_txs() -> u32 {
    20
}

fn default_halt_file() -> String {
    "halt.flag".to_string()
}

fn default_risk_tolerance() -> String {
    "medium".to_string()
}

fn default_gas_reserve_near() -> f64 {
    2.0
}

fn default_min_auto_execute_usd() -> f64 {
    5.0
}

fn default_state_dir() -> String {
    match std::env::var("HOME") {
        Ok(home) => format!("{}/.near-agent/state", home),
        Err(_) => "state".into(),
    }
}

fn default_account_file() -> String {
    match std::env::var("HOME") {
        Ok(home) => format!("{}/.near-agent/credentials/account.json", home),
        Err(_) => "account.json".into(),
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_rpc_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            price_api_url: default_price_api_url(),
            timeout_ms: default_price_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_single_tx_usd: default_max_single_tx_usd(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            weekly_loss_limit_pct: default_weekly_loss_limit_pct(),
            min_balance_floor_near: default_min_balance_floor_near(),
            max_concentration_pct: default_max_concentration_pct(),
            min_health_factor: default_min_health_factor(),
            emergency_health_factor: default_emergency_health_factor(),
            max_slippage_pct: default_max_slippage_pct(),
            max_daily_txs: default_max_daily_txs(),
            halt_file: default_halt_file(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            risk_tolerance: default_risk_tolerance(),
            gas_reserve_near: default_gas_reserve_near(),
            min_auto_execute_usd: default_min_auto_execute_usd(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            account_file: default_account_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            oracle: OracleConfig::default(),
            guardrails: GuardrailConfig::default(),
            strategy: StrategyConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix AGENT_)
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.guardrails.max_single_tx_usd <= 0.0 {
            anyhow::bail!("max_single_tx_usd must be positive");
        }

        if self.guardrails.min_balance_floor_near < 0.0 {
            anyhow::bail!("min_balance_floor_near cannot be negative");
        }

        if self.guardrails.max_daily_txs == 0 {
            anyhow::bail!("max_daily_txs must be at least 1");
        }

        if self.guardrails.emergency_health_factor >= self.guardrails.min_health_factor {
            anyhow::bail!(
                "emergency_health_factor ({}) must be below min_health_factor ({})",
                self.guardrails.emergency_health_factor,
                self.guardrails.min_health_factor
            );
        }

        if self.guardrails.max_slippage_pct <= 0.0 || self.guardrails.max_slippage_pct > 100.0 {
            anyhow::bail!("max_slippage_pct must be between 0 and 100");
        }

        match self.strategy.risk_tolerance.as_str() {
            "low" | "medium" | "high" => {}
            other => anyhow::bail!("risk_tolerance must be low, medium, or high, got '{}'", other),
        }

        if self.strategy.gas_reserve_near < 0.0 {
            anyhow::bail!("gas_reserve_near cannot be negative");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide credentials in URLs)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Oracle:
    price_api: {}
    cache_ttl: {}s
  Guardrails:
    max_single_tx: ${}
    daily_loss_limit: {}%
    weekly_loss_limit: {}%
    min_balance_floor: {} NEAR
    max_concentration: {}%
    health_factor: min {} / emergency {}
    max_daily_txs: {}
  Strategy:
    risk_tolerance: {}
    gas_reserve: {} NEAR
  State:
    dir: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            mask_url(&self.oracle.price_api_url),
            self.oracle.cache_ttl_secs,
            self.guardrails.max_single_tx_usd,
            self.guardrails.daily_loss_limit_pct,
            self.guardrails.weekly_loss_limit_pct,
            self.guardrails.min_balance_floor_near,
            self.guardrails.max_concentration_pct,
            self.guardrails.min_health_factor,
            self.guardrails.emergency_health_factor,
            self.guardrails.max_daily_txs,
            self.strategy.risk_tolerance,
            self.strategy.gas_reserve_near,
            self.state.dir,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
