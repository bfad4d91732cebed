//! Portfolio state tracking
//!
//! On-chain balance refresh across the supported token set, on-disk
//! holdings and positions snapshots, and the append-only strategy audit
//! log. Log entries are write-once; the log file is only ever appended.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::chain::rpc::NearRpcClient;
use crate::error::{Error, Result};
use crate::market::tokens::{raw_to_human, Token};
use crate::protocols::lending::BurrowAccountView;
use crate::protocols::staking::MetaPoolAccountView;

/// One token holding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub raw: u128,
    pub human: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usd_value: Option<f64>,
}

/// Persisted portfolio snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub account_id: String,
    pub holdings: BTreeMap<String, Holding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_usd_value: Option<f64>,
    pub last_update: Option<String>,
}

impl PortfolioSnapshot {
    /// Human-readable balance of one token, 0 when absent
    pub fn balance_of(&self, token: Token) -> f64 {
        self.holdings
            .get(token.symbol())
            .map(|h| h.human)
            .unwrap_or(0.0)
    }

    /// Per-token USD holdings, for the concentration check
    pub fn holdings_usd(&self) -> HashMap<Token, f64> {
        self.holdings
            .iter()
            .filter_map(|(symbol, holding)| {
                let token = Token::from_symbol(symbol)?;
                Some((token, holding.usd_value.unwrap_or(0.0)))
            })
            .collect()
    }
}

/// Active lending position snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingPosition {
    pub account: BurrowAccountView,
    pub health_factor: f64,
}

/// Persisted DeFi positions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Positions {
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staking: Option<MetaPoolAccountView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lending: Option<LendingPosition>,
    pub last_update: Option<String>,
}

/// One audit log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub account_id: String,
    pub action: String,
    #[serde(flatten)]
    pub details: Value,
}

/// Manages portfolio state on disk
pub struct Portfolio {
    account_id: String,
    portfolio_file: PathBuf,
    positions_file: PathBuf,
    log_file: PathBuf,
}

impl Portfolio {
    pub fn new(account_id: &str, state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir).map_err(|e| {
            Error::StatePersistence(format!("Cannot create {}: {}", state_dir.display(), e))
        })?;
        Ok(Self {
            account_id: account_id.to_string(),
            portfolio_file: state_dir.join("portfolio.json"),
            positions_file: state_dir.join("positions.json"),
            log_file: state_dir.join("strategy_log.jsonl"),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    // ------------------------------------------------------------------
    // On-chain balance queries
    // ------------------------------------------------------------------

    /// Fetch all known token balances. Tokens the account has never
    /// touched simply come back zero or fail; both are skipped.
    pub async fn fetch_all_balances(&self, rpc: &NearRpcClient) -> HashMap<Token, u128> {
        let mut balances = HashMap::new();
        for token in Token::ALL {
            let result = match token.contract() {
                None => rpc.get_balance(&self.account_id).await,
                Some(contract) => rpc.ft_balance_of(contract, &self.account_id).await,
            };
            match result {
                Ok(raw) if raw > 0 => {
                    balances.insert(token, raw);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(token = %token, "Balance fetch skipped: {}", e);
                }
            }
        }
        balances
    }

    /// Refresh the portfolio snapshot from on-chain data, valuing
    /// holdings against the supplied prices.
    pub async fn refresh(
        &self,
        rpc: &NearRpcClient,
        prices_usd: &HashMap<Token, f64>,
    ) -> Result<PortfolioSnapshot> {
        let balances = self.fetch_all_balances(rpc).await;

        let mut holdings = BTreeMap::new();
        let mut total_usd = 0.0;
        for (token, raw) in balances {
            let human = raw_to_human(raw, token.decimals());
            let usd_value = prices_usd.get(&token).map(|price| {
                let value = human * price;
                total_usd += value;
                (value * 100.0).round() / 100.0
            });
            holdings.insert(
                token.symbol().to_string(),
                Holding {
                    raw,
                    human,
                    usd_value,
                },
            );
        }

        let snapshot = PortfolioSnapshot {
            account_id: self.account_id.clone(),
            holdings,
            total_usd_value: Some((total_usd * 100.0).round() / 100.0),
            last_update: Some(Utc::now().to_rfc3339()),
        };
        self.save_portfolio(&snapshot)?;
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn load_portfolio(&self) -> Result<PortfolioSnapshot> {
        load_json_or_default(&self.portfolio_file)
    }

    pub fn save_portfolio(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        write_atomic(&self.portfolio_file, &serde_json::to_vec_pretty(snapshot)?)
    }

    pub fn load_positions(&self) -> Result<Positions> {
        load_json_or_default(&self.positions_file)
    }

    pub fn save_positions(&self, positions: &Positions) -> Result<()> {
        let mut positions = positions.clone();
        positions.account_id = self.account_id.clone();
        positions.last_update = Some(Utc::now().to_rfc3339());
        write_atomic(&self.positions_file, &serde_json::to_vec_pretty(&positions)?)
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    /// Append one action to the audit log
    pub fn log_action(&self, action: &str, details: Value) -> Result<()> {
        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339(),
            account_id: self.account_id.clone(),
            action: action.to_string(),
            details,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(|e| Error::StatePersistence(format!("Cannot open audit log: {}", e)))?;
        let line = serde_json::to_string(&entry)?;
        writeln!(file, "{}", line)
            .map_err(|e| Error::StatePersistence(format!("Cannot append audit log: {}", e)))?;
        Ok(())
    }

    /// Audit entries from the trailing window. Malformed lines are
    /// skipped, not fatal.
    pub fn recent_actions(&self, hours: i64) -> Vec<AuditEntry> {
        let Ok(content) = fs::read_to_string(&self.log_file) else {
            return Vec::new();
        };
        let cutoff = (Utc::now() - Duration::hours(hours)).to_rfc3339();

        content
            .lines()
            .filter_map(|line| match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) if entry.timestamp >= cutoff => Some(entry),
                Ok(_) => None,
                Err(e) => {
                    warn!("Skipping malformed audit line: {}", e);
                    None
                }
            })
            .collect()
    }
}

fn load_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| Error::StatePersistence(format!("Cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::StatePersistence(format!("Corrupt state file {}: {}", path.display(), e)))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| Error::StatePersistence(format!("Cannot write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::StatePersistence(format!("Cannot rename into {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let portfolio = Portfolio::new("agent.near", dir.path()).unwrap();

        let mut holdings = BTreeMap::new();
        holdings.insert(
            "NEAR".to_string(),
            Holding {
                raw: 5 * 10u128.pow(24),
                human: 5.0,
                usd_value: Some(17.5),
            },
        );
        let snapshot = PortfolioSnapshot {
            account_id: "agent.near".into(),
            holdings,
            total_usd_value: Some(17.5),
            last_update: None,
        };
        portfolio.save_portfolio(&snapshot).unwrap();

        let loaded = portfolio.load_portfolio().unwrap();
        assert_eq!(loaded.balance_of(Token::Near), 5.0);
        assert_eq!(loaded.holdings_usd().get(&Token::Near), Some(&17.5));
    }

    #[test]
    fn test_empty_state_defaults() {
        let dir = tempdir().unwrap();
        let portfolio = Portfolio::new("agent.near", dir.path()).unwrap();

        let snapshot = portfolio.load_portfolio().unwrap();
        assert!(snapshot.holdings.is_empty());
        assert!(portfolio.load_positions().unwrap().staking.is_none());
    }

    #[test]
    fn test_audit_log_appends() {
        let dir = tempdir().unwrap();
        let portfolio = Portfolio::new("agent.near", dir.path()).unwrap();

        portfolio
            .log_action("rebalance", json!({ "actions_taken": 2 }))
            .unwrap();
        portfolio
            .log_action("heartbeat", json!({ "errors": [] }))
            .unwrap();

        let entries = portfolio.recent_actions(24);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "rebalance");
        assert_eq!(entries[0].details["actions_taken"], 2);
        assert_eq!(entries[1].action, "heartbeat");
    }

    #[test]
    fn test_recent_actions_skips_old_and_malformed() {
        let dir = tempdir().unwrap();
        let portfolio = Portfolio::new("agent.near", dir.path()).unwrap();

        let old = AuditEntry {
            timestamp: "2000-01-01T00:00:00+00:00".into(),
            account_id: "agent.near".into(),
            action: "ancient".into(),
            details: json!({}),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.path().join("strategy_log.jsonl"))
            .unwrap();
        writeln!(file, "{}", serde_json::to_string(&old).unwrap()).unwrap();
        writeln!(file, "not json at all").unwrap();
        drop(file);

        portfolio.log_action("fresh", json!({})).unwrap();

        let entries = portfolio.recent_actions(24);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "fresh");
    }
}
