//! Guardrail engine
//!
//! Code-enforced trading limits. Every mutating action passes through
//! [`Guardrails::pre_tx_check`] before anything is signed; the checks
//! cannot be overridden by the strategy layer. Checks are fail-fast: the
//! first violated rule is returned and nothing else runs.

pub mod state;

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::config::GuardrailConfig;
use crate::error::Result;
use crate::market::tokens::Token;
use self::state::{utc_today, StateStore, TxCounter, ValueSnapshot};

/// Named guardrail rules, as they appear in outcome documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    Halt,
    DailyTxLimit,
    MaxTxSize,
    MinBalance,
    Concentration,
    Slippage,
    HealthFactorWarning,
    HealthFactorEmergency,
    DailyLoss,
    WeeklyLoss,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Halt => "HALT",
            Rule::DailyTxLimit => "DAILY_TX_LIMIT",
            Rule::MaxTxSize => "MAX_TX_SIZE",
            Rule::MinBalance => "MIN_BALANCE",
            Rule::Concentration => "CONCENTRATION",
            Rule::Slippage => "SLIPPAGE",
            Rule::HealthFactorWarning => "HEALTH_FACTOR_WARNING",
            Rule::HealthFactorEmergency => "HEALTH_FACTOR_EMERGENCY",
            Rule::DailyLoss => "DAILY_LOSS",
            Rule::WeeklyLoss => "WEEKLY_LOSS",
        }
    }
}

/// A failed guardrail check. The transaction MUST NOT proceed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
}

impl Violation {
    fn new(rule: Rule, message: String) -> Self {
        Self { rule, message }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GUARDRAIL [{}]: {}", self.rule.as_str(), self.message)
    }
}

impl std::error::Error for Violation {}

/// Action verbs the gate distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Stake,
    Supply,
    Borrow,
    Unstake,
    Withdraw,
    Hold,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verb::Stake => "stake",
            Verb::Supply => "supply",
            Verb::Borrow => "borrow",
            Verb::Unstake => "unstake",
            Verb::Withdraw => "withdraw",
            Verb::Hold => "hold",
        };
        f.write_str(s)
    }
}

/// Health factor classification against the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Emergency,
}

/// Parameters for the composite pre-transaction check
#[derive(Debug, Clone)]
pub struct PendingAction<'a> {
    pub verb: Verb,
    /// USD value of the transaction (0 skips the size check)
    pub amount_usd: f64,
    /// Current native balance in NEAR
    pub near_balance: f64,
    /// NEAR being spent by this action
    pub spend_near: f64,
    /// Current per-asset USD holdings, for the concentration check
    pub holdings_usd: Option<&'a HashMap<Token, f64>>,
    /// Asset the action adds exposure to
    pub target_token: Option<Token>,
    /// Current lending health factor, if a position exists
    pub health_factor: Option<f64>,
}

impl<'a> PendingAction<'a> {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            amount_usd: 0.0,
            near_balance: 0.0,
            spend_near: 0.0,
            holdings_usd: None,
            target_token: None,
            health_factor: None,
        }
    }
}

type Check = std::result::Result<(), Violation>;

/// Enforces trading guardrails against the persisted state
pub struct Guardrails {
    config: GuardrailConfig,
    state: StateStore,
}

impl Guardrails {
    pub fn new(config: GuardrailConfig, state_dir: &Path) -> Result<Self> {
        let state = StateStore::open(state_dir, &config.halt_file)?;
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    // ------------------------------------------------------------------
    // Halt
    // ------------------------------------------------------------------

    /// Reject unconditionally while the halt marker exists
    pub fn check_halt(&self) -> Check {
        if self.state.is_halted() {
            return Err(Violation::new(
                Rule::Halt,
                format!(
                    "Trading halted. Remove {} to resume.",
                    self.state.halt_path().display()
                ),
            ));
        }
        Ok(())
    }

    /// Halt all trading by writing the halt marker
    pub fn halt_trading(&self, reason: &str) -> Result<()> {
        warn!(reason, "Halting trading");
        self.state.write_halt(reason)
    }

    /// Resume trading by removing the halt marker (operator action)
    pub fn resume_trading(&self) -> Result<()> {
        self.state.clear_halt()
    }

    // ------------------------------------------------------------------
    // Transaction size
    // ------------------------------------------------------------------

    /// A ceiling at or above 1,000,000 USD means unrestricted mode
    pub fn check_tx_size(&self, amount_usd: f64) -> Check {
        if self.config.max_single_tx_usd >= 1_000_000.0 {
            return Ok(());
        }
        if amount_usd > self.config.max_single_tx_usd {
            return Err(Violation::new(
                Rule::MaxTxSize,
                format!(
                    "Transaction ${:.2} exceeds max ${:.2}",
                    amount_usd, self.config.max_single_tx_usd
                ),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Minimum balance floor
    // ------------------------------------------------------------------

    pub fn check_min_balance(&self, near_balance: f64, spend_near: f64) -> Check {
        let remaining = near_balance - spend_near;
        if remaining < self.config.min_balance_floor_near {
            return Err(Violation::new(
                Rule::MinBalance,
                format!(
                    "Would leave {:.4} NEAR, below floor of {} NEAR",
                    remaining, self.config.min_balance_floor_near
                ),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Concentration
    // ------------------------------------------------------------------

    /// Reject if the target asset's post-trade share of the portfolio
    /// would exceed the configured cap. A cap at or above 100% disables
    /// the check.
    pub fn check_concentration(
        &self,
        holdings_usd: &HashMap<Token, f64>,
        token: Token,
        add_amount_usd: f64,
    ) -> Check {
        if self.config.max_concentration_pct >= 100.0 {
            return Ok(());
        }
        let total: f64 = holdings_usd.values().sum::<f64>() + add_amount_usd;
        if total <= 0.0 {
            return Ok(());
        }
        let current = holdings_usd.get(&token).copied().unwrap_or(0.0) + add_amount_usd;
        let pct = current / total * 100.0;
        if pct > self.config.max_concentration_pct {
            return Err(Violation::new(
                Rule::Concentration,
                format!(
                    "{} would be {:.1}% of portfolio, exceeds max {}%",
                    token, pct, self.config.max_concentration_pct
                ),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Slippage
    // ------------------------------------------------------------------

    pub fn check_slippage(&self, expected_amount: f64, actual_amount: f64) -> Check {
        if expected_amount <= 0.0 {
            return Ok(());
        }
        let slippage_pct = (expected_amount - actual_amount) / expected_amount * 100.0;
        if slippage_pct > self.config.max_slippage_pct {
            return Err(Violation::new(
                Rule::Slippage,
                format!(
                    "Slippage {:.2}% exceeds max {}%",
                    slippage_pct, self.config.max_slippage_pct
                ),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Health factor
    // ------------------------------------------------------------------

    /// Classify a health factor into ok / warning / emergency
    pub fn health_status(&self, health_factor: f64) -> HealthStatus {
        if health_factor < self.config.emergency_health_factor {
            HealthStatus::Emergency
        } else if health_factor < self.config.min_health_factor {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        }
    }

    /// Emergency tier rejects any leveraging action; the warning tier
    /// rejects only new borrowing — a warning-tier account may still
    /// reduce risk.
    pub fn enforce_health_factor(&self, health_factor: f64, verb: Verb) -> Check {
        match self.health_status(health_factor) {
            HealthStatus::Emergency => Err(Violation::new(
                Rule::HealthFactorEmergency,
                format!(
                    "Health factor {:.2} is critical (< {}). Cannot {}. Must deleverage.",
                    health_factor, self.config.emergency_health_factor, verb
                ),
            )),
            HealthStatus::Warning if verb == Verb::Borrow => Err(Violation::new(
                Rule::HealthFactorWarning,
                format!(
                    "Health factor {:.2} is below safe threshold ({}). Cannot borrow more.",
                    health_factor, self.config.min_health_factor
                ),
            )),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Daily transaction count
    // ------------------------------------------------------------------

    pub fn check_daily_tx_count(&self) -> Result<()> {
        let counter = self.state.load_tx_counter()?;
        let count = if counter.date == utc_today() {
            counter.count
        } else {
            0
        };
        if count >= self.config.max_daily_txs {
            return Err(Violation::new(
                Rule::DailyTxLimit,
                format!(
                    "Daily tx limit reached ({}). Halting for today.",
                    self.config.max_daily_txs
                ),
            )
            .into());
        }
        Ok(())
    }

    /// Record one confirmed submission. Call strictly after the chain has
    /// accepted the transaction, never before.
    pub fn record_transaction(&self) -> Result<()> {
        let today = utc_today();
        let mut counter = self.state.load_tx_counter()?;
        if counter.date != today {
            counter = TxCounter {
                date: today,
                count: 0,
            };
        }
        counter.count += 1;
        self.state.save_tx_counter(&counter)
    }

    // ------------------------------------------------------------------
    // Loss limits
    // ------------------------------------------------------------------

    /// Record the current portfolio value for loss tracking. Call once per
    /// evaluation cycle regardless of the cycle's outcome.
    pub fn record_portfolio_value(&self, total_usd: f64) -> Result<()> {
        let mut history = self.state.load_history()?;
        if history.start_value_usd == 0.0 {
            history.start_value_usd = total_usd;
        }
        history.daily.insert(
            utc_today(),
            ValueSnapshot {
                value_usd: total_usd,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.state.save_history(&history)
    }

    /// Check daily and weekly loss limits against the recorded history.
    ///
    /// The daily baseline is the most recent value recorded strictly
    /// before today (falling back to the all-time start value). The weekly
    /// baseline is the earliest of the trailing 7 recorded samples — not a
    /// calendar week. A breach writes the halt marker before returning the
    /// violation.
    pub fn check_loss_limits(&self, current_value_usd: f64) -> Result<()> {
        if self.config.daily_loss_limit_pct >= 100.0 && self.config.weekly_loss_limit_pct >= 100.0 {
            return Ok(());
        }

        let history = self.state.load_history()?;
        if history.start_value_usd <= 0.0 {
            return Ok(());
        }

        let today = utc_today();

        // Daily: last recorded value strictly before today
        let day_start = history
            .daily
            .range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(today.as_str())))
            .next_back()
            .map(|(_, snapshot)| snapshot.value_usd)
            .unwrap_or(history.start_value_usd);

        if day_start > 0.0 {
            let daily_loss_pct = (day_start - current_value_usd) / day_start * 100.0;
            if daily_loss_pct > self.config.daily_loss_limit_pct {
                let reason = format!(
                    "Daily loss {:.1}% exceeds {}%",
                    daily_loss_pct, self.config.daily_loss_limit_pct
                );
                self.halt_trading(&reason)?;
                return Err(Violation::new(
                    Rule::DailyLoss,
                    format!(
                        "Daily loss {:.1}% exceeds limit of {}%. Trading halted.",
                        daily_loss_pct, self.config.daily_loss_limit_pct
                    ),
                )
                .into());
            }
        }

        // Weekly: earliest of the trailing 7 recorded samples
        let keys: Vec<&String> = history.daily.keys().collect();
        if let Some(first_key) = keys.get(keys.len().saturating_sub(7)) {
            let week_start = history.daily[*first_key].value_usd;
            if week_start > 0.0 {
                let weekly_loss_pct = (week_start - current_value_usd) / week_start * 100.0;
                if weekly_loss_pct > self.config.weekly_loss_limit_pct {
                    let reason = format!(
                        "Weekly loss {:.1}% exceeds {}%",
                        weekly_loss_pct, self.config.weekly_loss_limit_pct
                    );
                    self.halt_trading(&reason)?;
                    return Err(Violation::new(
                        Rule::WeeklyLoss,
                        format!(
                            "Weekly loss {:.1}% exceeds limit of {}%. Trading halted.",
                            weekly_loss_pct, self.config.weekly_loss_limit_pct
                        ),
                    )
                    .into());
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Combined pre-transaction check
    // ------------------------------------------------------------------

    /// Run all applicable checks before a transaction, in order, returning
    /// on the first violation with no side effects.
    ///
    /// Call this BEFORE signing anything. `Err(Error::Guardrail(..))` means
    /// the action is rejected; any other error is a state-read failure.
    pub fn pre_tx_check(&self, action: &PendingAction<'_>) -> Result<()> {
        self.check_halt()?;
        self.check_daily_tx_count()?;

        if action.amount_usd > 0.0 {
            self.check_tx_size(action.amount_usd)?;
        }

        if action.spend_near > 0.0 && action.near_balance > 0.0 {
            self.check_min_balance(action.near_balance, action.spend_near)?;
        }

        if let (Some(holdings), Some(token)) = (action.holdings_usd, action.target_token) {
            if action.amount_usd > 0.0 {
                self.check_concentration(holdings, token, action.amount_usd)?;
            }
        }

        if let Some(health_factor) = action.health_factor {
            self.enforce_health_factor(health_factor, action.verb)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::state::ValueHistory;
    use crate::error::Error;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn test_guardrails(dir: &Path) -> Guardrails {
        Guardrails::new(GuardrailConfig::default(), dir).unwrap()
    }

    fn seed_history(g: &Guardrails, start: f64, samples: &[(&str, f64)]) {
        let mut daily = BTreeMap::new();
        for (date, value) in samples {
            daily.insert(
                date.to_string(),
                ValueSnapshot {
                    value_usd: *value,
                    timestamp: String::new(),
                },
            );
        }
        g.state
            .save_history(&ValueHistory {
                start_value_usd: start,
                daily,
            })
            .unwrap();
    }

    #[test]
    fn test_halt_rejects_everything() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());
        g.halt_trading("manual").unwrap();

        // Rejected regardless of any other parameter, including no health factor
        let action = PendingAction::new(Verb::Stake);
        let err = g.pre_tx_check(&action).unwrap_err();
        match err {
            Error::Guardrail(v) => assert_eq!(v.rule, Rule::Halt),
            other => panic!("expected guardrail violation, got {}", other),
        }

        g.resume_trading().unwrap();
        assert!(g.pre_tx_check(&action).is_ok());
    }

    #[test]
    fn test_tx_size_limit_and_unrestricted_mode() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        assert!(g.check_tx_size(499.0).is_ok());
        let v = g.check_tx_size(501.0).unwrap_err();
        assert_eq!(v.rule, Rule::MaxTxSize);

        let mut config = GuardrailConfig::default();
        config.max_single_tx_usd = 1_000_000.0;
        let unrestricted = Guardrails::new(config, dir.path()).unwrap();
        assert!(unrestricted.check_tx_size(5_000_000.0).is_ok());
    }

    #[test]
    fn test_min_balance_floor() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        // Floor is 2.0 NEAR
        assert!(g.check_min_balance(10.0, 7.9).is_ok());
        let v = g.check_min_balance(10.0, 8.5).unwrap_err();
        assert_eq!(v.rule, Rule::MinBalance);
    }

    #[test]
    fn test_concentration_math() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        let mut holdings = HashMap::new();
        holdings.insert(Token::Near, 60.0);
        holdings.insert(Token::Usdc, 40.0);

        // Adding 20 to NEAR: 80/120 = 66.7% > 60% cap
        let v = g
            .check_concentration(&holdings, Token::Near, 20.0)
            .unwrap_err();
        assert_eq!(v.rule, Rule::Concentration);

        // Adding 20 to USDC instead: NEAR stays 60/120 = 50%, USDC 60/120 = 50%
        assert!(g.check_concentration(&holdings, Token::Usdc, 20.0).is_ok());
    }

    #[test]
    fn test_concentration_disabled_at_100() {
        let dir = tempdir().unwrap();
        let mut config = GuardrailConfig::default();
        config.max_concentration_pct = 100.0;
        let g = Guardrails::new(config, dir.path()).unwrap();

        let mut holdings = HashMap::new();
        holdings.insert(Token::Near, 100.0);
        assert!(g.check_concentration(&holdings, Token::Near, 1000.0).is_ok());
    }

    #[test]
    fn test_health_factor_tiers() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        // emergency=1.2, min=1.5
        assert_eq!(g.health_status(1.1), HealthStatus::Emergency);
        assert_eq!(g.health_status(1.4), HealthStatus::Warning);
        assert_eq!(g.health_status(2.0), HealthStatus::Ok);

        // Emergency rejects any leveraging action
        let v = g.enforce_health_factor(1.1, Verb::Borrow).unwrap_err();
        assert_eq!(v.rule, Rule::HealthFactorEmergency);
        let v = g.enforce_health_factor(1.1, Verb::Supply).unwrap_err();
        assert_eq!(v.rule, Rule::HealthFactorEmergency);

        // Warning rejects only borrow
        let v = g.enforce_health_factor(1.4, Verb::Borrow).unwrap_err();
        assert_eq!(v.rule, Rule::HealthFactorWarning);
        assert!(g.enforce_health_factor(1.4, Verb::Supply).is_ok());
        assert!(g.enforce_health_factor(1.4, Verb::Withdraw).is_ok());

        assert!(g.enforce_health_factor(2.0, Verb::Borrow).is_ok());
    }

    #[test]
    fn test_slippage() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        // Max slippage 2%
        assert!(g.check_slippage(100.0, 98.5).is_ok());
        let v = g.check_slippage(100.0, 97.0).unwrap_err();
        assert_eq!(v.rule, Rule::Slippage);
        // Zero expected amount is a no-op
        assert!(g.check_slippage(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_daily_tx_count_increments_and_resets() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        g.record_transaction().unwrap();
        g.record_transaction().unwrap();
        let counter = g.state.load_tx_counter().unwrap();
        assert_eq!(counter.count, 2);
        assert_eq!(counter.date, utc_today());

        // A stale date resets to 1 on the next record
        g.state
            .save_tx_counter(&TxCounter {
                date: "2020-01-01".into(),
                count: 19,
            })
            .unwrap();
        g.record_transaction().unwrap();
        assert_eq!(g.state.load_tx_counter().unwrap().count, 1);
    }

    #[test]
    fn test_daily_tx_limit_enforced() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        g.state
            .save_tx_counter(&TxCounter {
                date: utc_today(),
                count: 20,
            })
            .unwrap();
        let err = g.check_daily_tx_count().unwrap_err();
        match err {
            Error::Guardrail(v) => assert_eq!(v.rule, Rule::DailyTxLimit),
            other => panic!("unexpected error: {}", other),
        }

        // A stale counter does not count against today
        g.state
            .save_tx_counter(&TxCounter {
                date: "2020-01-01".into(),
                count: 20,
            })
            .unwrap();
        assert!(g.check_daily_tx_count().is_ok());
    }

    #[test]
    fn test_daily_loss_halts() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        // Baseline 1000, prior day recorded at 950
        seed_history(&g, 1000.0, &[("2000-01-01", 950.0)]);

        // 890: 6.3% drop from 950 against a 5% limit
        let err = g.check_loss_limits(890.0).unwrap_err();
        match err {
            Error::Guardrail(v) => assert_eq!(v.rule, Rule::DailyLoss),
            other => panic!("unexpected error: {}", other),
        }
        assert!(g.state.is_halted());

        // 920: 3.2% drop passes
        g.resume_trading().unwrap();
        seed_history(&g, 1000.0, &[("2000-01-01", 950.0)]);
        assert!(g.check_loss_limits(920.0).is_ok());
        assert!(!g.state.is_halted());
    }

    #[test]
    fn test_weekly_loss_uses_trailing_seven_samples() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        // Eight samples; the weekly window starts at the second (1000)
        let samples: Vec<(String, f64)> = (1..=8)
            .map(|day| {
                let value = if day == 1 { 2000.0 } else if day == 8 { 900.0 } else { 1000.0 };
                (format!("2000-01-{:02}", day), value)
            })
            .collect();
        let refs: Vec<(&str, f64)> = samples.iter().map(|(d, v)| (d.as_str(), *v)).collect();
        seed_history(&g, 2000.0, &refs);

        // Daily: 1.1% drop from 900 passes. Weekly: 11% drop from 1000 breaches.
        let err = g.check_loss_limits(890.0).unwrap_err();
        match err {
            Error::Guardrail(v) => assert_eq!(v.rule, Rule::WeeklyLoss),
            other => panic!("unexpected error: {}", other),
        }
        assert!(g.state.is_halted());
    }

    #[test]
    fn test_loss_limits_noop_without_baseline() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());
        assert!(g.check_loss_limits(1.0).is_ok());
    }

    #[test]
    fn test_loss_limits_disabled_at_100() {
        let dir = tempdir().unwrap();
        let mut config = GuardrailConfig::default();
        config.daily_loss_limit_pct = 100.0;
        config.weekly_loss_limit_pct = 100.0;
        let g = Guardrails::new(config, dir.path()).unwrap();

        seed_history(&g, 1000.0, &[("2000-01-01", 950.0)]);
        assert!(g.check_loss_limits(1.0).is_ok());
    }

    #[test]
    fn test_record_portfolio_value_sets_baseline_once() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());

        g.record_portfolio_value(1000.0).unwrap();
        g.record_portfolio_value(800.0).unwrap();

        let history = g.state.load_history().unwrap();
        assert_eq!(history.start_value_usd, 1000.0);
        assert_eq!(history.daily[&utc_today()].value_usd, 800.0);
    }

    #[test]
    fn test_pre_tx_check_order_halt_first() {
        let dir = tempdir().unwrap();
        let g = test_guardrails(dir.path());
        g.halt_trading("stop").unwrap();

        // Even an action that would violate several later rules reports HALT
        let mut action = PendingAction::new(Verb::Borrow);
        action.amount_usd = 1e9;
        action.health_factor = Some(0.5);
        match g.pre_tx_check(&action).unwrap_err() {
            Error::Guardrail(v) => assert_eq!(v.rule, Rule::Halt),
            other => panic!("unexpected error: {}", other),
        }
    }
}
