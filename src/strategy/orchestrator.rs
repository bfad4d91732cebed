//! Workflow orchestration
//!
//! Drives the rebalance, emergency-exit, and heartbeat workflows. Every
//! step follows the same discipline: evaluate guardrails, attempt the
//! action, record the outcome, continue. A failed step never aborts the
//! rest of the workflow — failures accumulate next to successes in the
//! run summary, and every run appends one audit entry.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::chain::rpc::NearRpcClient;
use crate::chain::tx::TransactionBuilder;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::guardrail::{Guardrails, HealthStatus, PendingAction, Verb};
use crate::market::oracle::PriceOracle;
use crate::market::tokens::{human_to_raw, raw_to_human, Token, NEAR_DECIMALS};
use crate::portfolio::{LendingPosition, Portfolio, PortfolioSnapshot};
use crate::protocols::lending::{Burrow, BurrowAccountView};
use crate::protocols::staking::{MetaPool, WNear};
use crate::strategy::yields::{
    recommend_allocation, AllocationRecommendation, Protocol, RiskLevel, YieldEngine, YieldReport,
};
use crate::wallet::keys::Credentials;

/// One executed action in a run summary
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// One failed step in a run summary
#[derive(Debug, Clone, Serialize)]
pub struct StepError {
    pub step: String,
    pub error: String,
}

/// Rebalance run summary
#[derive(Debug, Serialize)]
pub struct RebalanceSummary {
    pub status: String,
    pub actions_taken: Vec<ActionRecord>,
    pub errors: Vec<StepError>,
    pub total_usd_before: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
}

/// Emergency-exit run summary
#[derive(Debug, Serialize)]
pub struct ExitSummary {
    pub status: String,
    pub actions: Vec<ActionRecord>,
    pub errors: Vec<StepError>,
    pub trading_halted: bool,
}

/// Heartbeat check results
#[derive(Debug, Default, Serialize)]
pub struct HeartbeatChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub near_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_limits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_status: Option<HealthStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<usize>,
}

/// Heartbeat run summary
#[derive(Debug, Serialize)]
pub struct HeartbeatSummary {
    pub status: String,
    pub timestamp: String,
    pub checks: HeartbeatChecks,
    pub actions_taken: Vec<ActionRecord>,
    pub errors: Vec<StepError>,
}

/// P&L figures for the daily report
#[derive(Debug, Serialize)]
pub struct PnlSummary {
    pub daily_usd: f64,
    pub daily_pct: f64,
    pub total_usd: f64,
    pub total_pct: f64,
    pub start_value_usd: f64,
}

/// Daily report document
#[derive(Debug, Serialize)]
pub struct DailyReport {
    pub status: String,
    pub timestamp: String,
    pub account_id: String,
    pub portfolio: PortfolioSnapshot,
    pub pnl: PnlSummary,
    pub positions: crate::portfolio::Positions,
    pub yield_report: YieldReport,
    pub trading_halted: bool,
    pub recent_actions_24h: usize,
}

/// One step of an emergency unwind plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnwindStep {
    /// Convert stNEAR back to NEAR via liquid unstake
    Unstake { stnear: f64 },
    /// Repay an outstanding loan in full
    Repay { token: Token, amount_raw: u128 },
    /// Withdraw supplied collateral in full
    Withdraw { token: Token, amount_raw: u128 },
    /// Unwrap wNEAR back to native NEAR
    Unwrap { near: f64 },
}

/// Build the strictly ordered unwind plan.
///
/// Repay precedes withdraw because collateral cannot leave while it backs
/// an open loan; unwrapping runs last because the earlier phases may yield
/// additional wNEAR.
pub fn plan_unwind(
    stnear_raw: u128,
    burrow: Option<&BurrowAccountView>,
    wnear_raw: u128,
) -> Vec<UnwindStep> {
    let mut plan = Vec::new();

    if stnear_raw > 0 {
        plan.push(UnwindStep::Unstake {
            stnear: raw_to_human(stnear_raw, NEAR_DECIMALS),
        });
    }

    if let Some(account) = burrow {
        for entry in &account.borrowed {
            if entry.balance_raw() > 0 {
                if let Some(token) = entry.token() {
                    plan.push(UnwindStep::Repay {
                        token,
                        amount_raw: entry.balance_raw(),
                    });
                }
            }
        }
        for entry in &account.collateral {
            if entry.balance_raw() > 0 {
                if let Some(token) = entry.token() {
                    plan.push(UnwindStep::Withdraw {
                        token,
                        amount_raw: entry.balance_raw(),
                    });
                }
            }
        }
    }

    if wnear_raw > 0 {
        plan.push(UnwindStep::Unwrap {
            near: raw_to_human(wnear_raw, NEAR_DECIMALS),
        });
    }

    plan
}

/// Owns the components and drives the workflows
pub struct Orchestrator {
    config: Config,
    credentials: Credentials,
    rpc: NearRpcClient,
    guardrails: Guardrails,
    portfolio: Portfolio,
    oracle: PriceOracle,
}

impl Orchestrator {
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        let rpc = NearRpcClient::new(&config.rpc)?;
        let state_dir = std::path::Path::new(&config.state.dir);
        let guardrails = Guardrails::new(config.guardrails.clone(), state_dir)?;
        let portfolio = Portfolio::new(&credentials.account_id, state_dir)?;
        let oracle = PriceOracle::new(&config.oracle)?;

        Ok(Self {
            config,
            credentials,
            rpc,
            guardrails,
            portfolio,
            oracle,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.credentials.account_id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn guardrails(&self) -> &Guardrails {
        &self.guardrails
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    fn builder(&self) -> TransactionBuilder<'_> {
        TransactionBuilder::new(&self.credentials, &self.rpc)
    }

    /// Resolve the risk tolerance, preferring an explicit override
    pub fn risk_tolerance(&self, cli_risk: Option<&str>) -> RiskLevel {
        cli_risk
            .and_then(RiskLevel::parse)
            .or_else(|| RiskLevel::parse(&self.config.strategy.risk_tolerance))
            .unwrap_or(RiskLevel::Medium)
    }

    // ------------------------------------------------------------------
    // Shared per-recommendation execution
    // ------------------------------------------------------------------

    /// Gate one recommendation through the guardrails, then dispatch it.
    /// Any failure lands in `errors`; successes land in `actions` and bump
    /// the daily transaction counter once per confirmed submission.
    async fn execute_recommendation(
        &self,
        rec: &AllocationRecommendation,
        snapshot: &PortfolioSnapshot,
        prices: &HashMap<Token, f64>,
        near_balance: f64,
        actions: &mut Vec<ActionRecord>,
        errors: &mut Vec<StepError>,
    ) {
        let near_price = prices.get(&Token::Near).copied().unwrap_or(0.0);
        let action_usd = if rec.token == Token::Near {
            rec.amount * near_price
        } else {
            rec.amount
        };
        let holdings_usd = snapshot.holdings_usd();

        let pending = PendingAction {
            verb: rec.action,
            amount_usd: action_usd,
            near_balance,
            spend_near: if rec.token == Token::Near {
                rec.amount
            } else {
                0.0
            },
            holdings_usd: Some(&holdings_usd),
            target_token: Some(rec.token),
            health_factor: None,
        };

        if let Err(e) = self.guardrails.pre_tx_check(&pending) {
            warn!(action = %rec.action, "Recommendation blocked: {}", e);
            errors.push(StepError {
                step: rec.action.to_string(),
                error: e.to_string(),
            });
            let _ = self.portfolio.log_action(
                "guardrail_blocked",
                json!({ "blocked_action": rec.action, "amount": rec.amount, "reason": e.to_string() }),
            );
            return;
        }

        let result = self.dispatch(rec, actions).await;
        if let Err(e) = result {
            errors.push(StepError {
                step: rec.action.to_string(),
                error: e.to_string(),
            });
            let _ = self.portfolio.log_action(
                "tx_error",
                json!({ "failed_action": rec.action, "amount": rec.amount, "error": e.to_string() }),
            );
        }
    }

    async fn dispatch(
        &self,
        rec: &AllocationRecommendation,
        actions: &mut Vec<ActionRecord>,
    ) -> Result<()> {
        let builder = self.builder();
        match (rec.action, rec.protocol) {
            (Verb::Stake, Some(Protocol::MetaPool)) => {
                let receipt = MetaPool::new(&builder).deposit_and_stake(rec.amount).await?;
                self.guardrails.record_transaction()?;
                actions.push(ActionRecord {
                    step: "stake".into(),
                    token: Some(Token::Near),
                    amount: Some(rec.amount),
                    tx_hash: Some(receipt.tx_hash),
                });
                Ok(())
            }
            (Verb::Supply, Some(Protocol::BurrowSupply)) => {
                // Burrow takes NEP-141 deposits only: wrap first
                let wnear = WNear::new(&builder);
                wnear.ensure_storage().await?;
                wnear.wrap(rec.amount).await?;
                self.guardrails.record_transaction()?;

                let burrow = Burrow::new(&builder);
                burrow.ensure_storage().await?;
                let supply_token = if rec.token == Token::Near {
                    Token::WNear
                } else {
                    rec.token
                };
                let amount_raw = human_to_raw(rec.amount, supply_token.decimals());
                let receipt = burrow.supply(supply_token, amount_raw).await?;
                self.guardrails.record_transaction()?;

                actions.push(ActionRecord {
                    step: "supply".into(),
                    token: Some(supply_token),
                    amount: Some(rec.amount),
                    tx_hash: Some(receipt.tx_hash),
                });
                Ok(())
            }
            (verb, protocol) => Err(Error::Internal(format!(
                "No execution path for {} on {:?}",
                verb, protocol
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Rebalance
    // ------------------------------------------------------------------

    pub async fn run_rebalance(&self, risk: RiskLevel) -> Result<RebalanceSummary> {
        let prices = self.oracle.all_prices_usd().await;
        let snapshot = self.portfolio.refresh(&self.rpc, &prices).await?;
        let total_usd = snapshot.total_usd_value.unwrap_or(0.0);

        if let Err(e) = self.guardrails.check_loss_limits(total_usd) {
            if e.is_guardrail() {
                self.portfolio
                    .log_action("rebalance_halted", json!({ "reason": e.to_string() }))?;
                return Ok(RebalanceSummary {
                    status: "halted".into(),
                    actions_taken: vec![],
                    errors: vec![],
                    total_usd_before: total_usd,
                    halt_reason: Some(e.to_string()),
                });
            }
            return Err(e);
        }

        let near_balance = snapshot.balance_of(Token::Near);
        let builder = self.builder();
        let engine = YieldEngine::new(&builder);
        let opportunities = engine.all_opportunities().await;
        let recommendations = recommend_allocation(
            &opportunities,
            near_balance,
            risk,
            self.config.strategy.gas_reserve_near,
        );

        let mut actions = Vec::new();
        let mut errors = Vec::new();

        for rec in recommendations.iter().filter(|r| r.action != Verb::Hold) {
            self.execute_recommendation(rec, &snapshot, &prices, near_balance, &mut actions, &mut errors)
                .await;
        }

        self.guardrails.record_portfolio_value(total_usd)?;
        self.portfolio.log_action(
            "rebalance",
            json!({
                "actions_taken": &actions,
                "errors": &errors,
                "recommendations_count": recommendations.len(),
            }),
        )?;

        Ok(RebalanceSummary {
            status: "ok".into(),
            actions_taken: actions,
            errors,
            total_usd_before: total_usd,
            halt_reason: None,
        })
    }

    // ------------------------------------------------------------------
    // Emergency exit
    // ------------------------------------------------------------------

    /// Unwind every position back to native NEAR, then halt trading.
    ///
    /// Phase order is a correctness requirement: repay before withdraw,
    /// unwrap last. Each step's failure is recorded and the remaining
    /// steps still run. Completion unconditionally sets the halt flag.
    pub async fn run_emergency_exit(&self) -> Result<ExitSummary> {
        let builder = self.builder();
        let meta_pool = MetaPool::new(&builder);
        let burrow = Burrow::new(&builder);
        let wnear = WNear::new(&builder);

        let mut actions = Vec::new();
        let mut errors = Vec::new();

        let stnear_raw = match meta_pool.stnear_balance().await {
            Ok(raw) => raw,
            Err(e) => {
                errors.push(StepError {
                    step: "unstake_stnear".into(),
                    error: e.to_string(),
                });
                0
            }
        };
        let burrow_account = match burrow.get_account().await {
            Ok(account) => account,
            Err(e) => {
                errors.push(StepError {
                    step: "burrow_unwind".into(),
                    error: e.to_string(),
                });
                None
            }
        };
        let wnear_raw = match wnear.balance().await {
            Ok(raw) => raw,
            Err(e) => {
                errors.push(StepError {
                    step: "unwrap_wnear".into(),
                    error: e.to_string(),
                });
                0
            }
        };

        let plan = plan_unwind(stnear_raw, burrow_account.as_ref(), wnear_raw);
        info!(steps = plan.len(), "Executing emergency unwind");

        for step in &plan {
            let (name, token, amount, result) = match step {
                UnwindStep::Unstake { stnear } => (
                    "unstake_stnear".to_string(),
                    Some(Token::StNear),
                    Some(*stnear),
                    meta_pool.liquid_unstake(*stnear, 0.0).await,
                ),
                UnwindStep::Repay { token, amount_raw } => (
                    format!("repay_{}", token),
                    Some(*token),
                    Some(raw_to_human(*amount_raw, token.decimals())),
                    burrow.repay(*token, *amount_raw).await,
                ),
                UnwindStep::Withdraw { token, amount_raw } => (
                    format!("withdraw_{}", token),
                    Some(*token),
                    Some(raw_to_human(*amount_raw, token.decimals())),
                    burrow.withdraw(*token, *amount_raw).await,
                ),
                UnwindStep::Unwrap { near } => (
                    "unwrap_wnear".to_string(),
                    Some(Token::WNear),
                    Some(*near),
                    wnear.unwrap(*near).await,
                ),
            };

            match result {
                Ok(receipt) => {
                    self.guardrails.record_transaction()?;
                    actions.push(ActionRecord {
                        step: name,
                        token,
                        amount,
                        tx_hash: Some(receipt.tx_hash),
                    });
                }
                Err(e) => errors.push(StepError {
                    step: name,
                    error: e.to_string(),
                }),
            }
        }

        self.portfolio.log_action(
            "emergency_exit",
            json!({ "actions": &actions, "errors": &errors }),
        )?;

        // Terminal state: no further trading until an operator resumes
        self.guardrails.halt_trading("Emergency exit executed")?;

        Ok(ExitSummary {
            status: "ok".into(),
            actions,
            errors,
            trading_halted: true,
        })
    }

    // ------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------

    /// Periodic check-and-maybe-act cycle for unattended scheduling.
    pub async fn run_heartbeat(&self, risk: RiskLevel) -> Result<HeartbeatSummary> {
        let mut summary = HeartbeatSummary {
            status: "ok".into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            checks: HeartbeatChecks::default(),
            actions_taken: vec![],
            errors: vec![],
        };

        // 1. Halt check: abort the cycle immediately
        if let Err(v) = self.guardrails.check_halt() {
            summary.checks.halt = Some(v.to_string());
            summary.status = "halted".into();
            return Ok(summary);
        }
        summary.checks.halt = Some("clear".into());

        // 2. Refresh balances and prices; nothing else can run without them
        let prices = self.oracle.all_prices_usd().await;
        let snapshot = match self.portfolio.refresh(&self.rpc, &prices).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                summary.errors.push(StepError {
                    step: "fetch_balances".into(),
                    error: e.to_string(),
                });
                return Ok(summary);
            }
        };
        let total_usd = snapshot.total_usd_value.unwrap_or(0.0);
        let near_balance = snapshot.balance_of(Token::Near);
        summary.checks.portfolio_usd = Some((total_usd * 100.0).round() / 100.0);
        summary.checks.near_balance = Some((near_balance * 10_000.0).round() / 10_000.0);

        // 3. Loss limits: abort and halt on breach, but still record the
        //    day's value below
        match self.guardrails.check_loss_limits(total_usd) {
            Ok(()) => summary.checks.loss_limits = Some("ok".into()),
            Err(e) if e.is_guardrail() => {
                summary.checks.loss_limits = Some(e.to_string());
                summary.status = "halted".into();
                self.portfolio
                    .log_action("heartbeat_halted", json!({ "reason": e.to_string() }))?;
                self.guardrails.record_portfolio_value(total_usd)?;
                return Ok(summary);
            }
            Err(e) => return Err(e),
        }

        // 4. Lending health factor, with repay-only emergency deleveraging
        self.check_lending_health(&mut summary).await;

        // 5. Yield check; auto-execute only above the economic threshold
        let builder = self.builder();
        let engine = YieldEngine::new(&builder);
        let opportunities = engine.all_opportunities().await;
        let recommendations = recommend_allocation(
            &opportunities,
            near_balance,
            risk,
            self.config.strategy.gas_reserve_near,
        );
        let actionable: Vec<&AllocationRecommendation> = recommendations
            .iter()
            .filter(|r| r.action != Verb::Hold)
            .collect();
        summary.checks.recommendations = Some(actionable.len());

        if !actionable.is_empty() && total_usd >= self.config.strategy.min_auto_execute_usd {
            let mut actions = Vec::new();
            let mut errors = Vec::new();
            for rec in actionable {
                self.execute_recommendation(rec, &snapshot, &prices, near_balance, &mut actions, &mut errors)
                    .await;
            }
            summary.actions_taken.extend(actions);
            summary.errors.extend(errors);
        }

        // 6. Record the day's value regardless of what happened above
        self.guardrails.record_portfolio_value(total_usd)?;
        self.portfolio.log_action(
            "heartbeat",
            json!({
                "checks": &summary.checks,
                "heartbeat_actions": &summary.actions_taken,
                "errors": &summary.errors,
            }),
        )?;

        Ok(summary)
    }

    /// Check the Burrow health factor; at the emergency tier, repay every
    /// outstanding loan whose token we recognize. Repay-only: no new
    /// borrowing, and the health factor is not recomputed between
    /// repayments.
    async fn check_lending_health(&self, summary: &mut HeartbeatSummary) {
        let builder = self.builder();
        let burrow = Burrow::new(&builder);

        let account = match burrow.get_account().await {
            Ok(Some(account)) if account.has_borrows() => account,
            Ok(_) => return,
            Err(e) => {
                summary.errors.push(StepError {
                    step: "health_check".into(),
                    error: e.to_string(),
                });
                return;
            }
        };

        let health_factor = account.health_factor();
        let status = self.guardrails.health_status(health_factor);
        summary.checks.health_factor = Some((health_factor * 100.0).round() / 100.0);
        summary.checks.health_status = Some(status);

        if status != HealthStatus::Emergency {
            return;
        }

        warn!(health_factor, "Emergency deleveraging triggered");
        for entry in &account.borrowed {
            if entry.balance_raw() == 0 {
                continue;
            }
            let Some(token) = entry.token() else { continue };
            match burrow.repay(token, entry.balance_raw()).await {
                Ok(receipt) => {
                    if let Err(e) = self.guardrails.record_transaction() {
                        summary.errors.push(StepError {
                            step: "emergency_deleverage".into(),
                            error: e.to_string(),
                        });
                    }
                    summary.actions_taken.push(ActionRecord {
                        step: format!("emergency_repay_{}", token),
                        token: Some(token),
                        amount: Some(raw_to_human(entry.balance_raw(), token.decimals())),
                        tx_hash: Some(receipt.tx_hash),
                    });
                }
                Err(e) => summary.errors.push(StepError {
                    step: "emergency_deleverage".into(),
                    error: e.to_string(),
                }),
            }
        }
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// Refresh and return the portfolio snapshot
    pub async fn balance_report(&self) -> Result<PortfolioSnapshot> {
        let prices = self.oracle.all_prices_usd().await;
        self.portfolio.refresh(&self.rpc, &prices).await
    }

    /// Refresh DeFi positions from the protocols and persist them
    pub async fn positions_report(&self) -> Result<crate::portfolio::Positions> {
        let builder = self.builder();
        let mut positions = self.portfolio.load_positions()?;

        match MetaPool::new(&builder).get_account_info().await {
            Ok(staking) => positions.staking = staking,
            Err(e) => warn!("Staking position refresh failed: {}", e),
        }

        match Burrow::new(&builder).get_account().await {
            Ok(Some(account)) => {
                let health_factor = account.health_factor();
                positions.lending = Some(LendingPosition {
                    account,
                    health_factor,
                });
            }
            Ok(None) => positions.lending = None,
            Err(e) => warn!("Lending position refresh failed: {}", e),
        }

        self.portfolio.save_positions(&positions)?;
        Ok(positions)
    }

    /// Full portfolio + yield + recommendation report
    pub async fn full_report(&self, risk: RiskLevel) -> Result<serde_json::Value> {
        let prices = self.oracle.all_prices_usd().await;
        let snapshot = self.portfolio.refresh(&self.rpc, &prices).await?;
        let near_balance = snapshot.balance_of(Token::Near);

        let builder = self.builder();
        let engine = YieldEngine::new(&builder);
        let yield_report = engine.report().await;
        let recommendations = recommend_allocation(
            &yield_report.opportunities,
            near_balance,
            risk,
            self.config.strategy.gas_reserve_near,
        );

        Ok(json!({
            "status": "ok",
            "account_id": self.account_id(),
            "portfolio": snapshot,
            "yield_opportunities": yield_report.opportunities,
            "recommendations": recommendations,
        }))
    }

    /// Daily P&L and portfolio summary for scheduled delivery
    pub async fn daily_report(&self) -> Result<DailyReport> {
        let prices = self.oracle.all_prices_usd().await;
        let snapshot = self.portfolio.refresh(&self.rpc, &prices).await?;
        let total_usd = snapshot.total_usd_value.unwrap_or(0.0);

        let history = self.guardrails.state().load_history()?;
        let start_value = history.start_value_usd;
        let today = crate::guardrail::state::utc_today();
        let yesterday_value = history
            .daily
            .range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(today.as_str())))
            .next_back()
            .map(|(_, s)| s.value_usd)
            .unwrap_or(start_value);

        let daily_usd = if yesterday_value > 0.0 {
            total_usd - yesterday_value
        } else {
            0.0
        };
        let daily_pct = if yesterday_value > 0.0 {
            daily_usd / yesterday_value * 100.0
        } else {
            0.0
        };
        let total_pnl = if start_value > 0.0 {
            total_usd - start_value
        } else {
            0.0
        };
        let total_pct = if start_value > 0.0 {
            total_pnl / start_value * 100.0
        } else {
            0.0
        };

        let positions = self.portfolio.load_positions()?;
        let builder = self.builder();
        let yield_report = YieldEngine::new(&builder).report().await;
        let recent = self.portfolio.recent_actions(24).len();

        self.guardrails.record_portfolio_value(total_usd)?;

        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        Ok(DailyReport {
            status: "ok".into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            account_id: self.account_id().to_string(),
            portfolio: snapshot,
            pnl: PnlSummary {
                daily_usd: round2(daily_usd),
                daily_pct: round2(daily_pct),
                total_usd: round2(total_pnl),
                total_pct: round2(total_pct),
                start_value_usd: round2(start_value),
            },
            positions,
            yield_report,
            trading_halted: self.guardrails.state().is_halted(),
            recent_actions_24h: recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::lending::BurrowBalanceView;

    fn balance(token_id: &str, raw: u128) -> BurrowBalanceView {
        BurrowBalanceView {
            token_id: token_id.into(),
            balance: raw.to_string(),
            shares: String::new(),
        }
    }

    #[test]
    fn test_unwind_repay_strictly_before_withdraw() {
        // Loan and collateral on the same token
        let account = BurrowAccountView {
            account_id: "agent.near".into(),
            supplied: vec![],
            collateral: vec![balance("wrap.near", 500)],
            borrowed: vec![balance("wrap.near", 200)],
        };

        let plan = plan_unwind(0, Some(&account), 0);
        let repay_idx = plan
            .iter()
            .position(|s| matches!(s, UnwindStep::Repay { token: Token::WNear, .. }))
            .expect("repay step missing");
        let withdraw_idx = plan
            .iter()
            .position(|s| matches!(s, UnwindStep::Withdraw { token: Token::WNear, .. }))
            .expect("withdraw step missing");
        assert!(repay_idx < withdraw_idx);
    }

    #[test]
    fn test_unwind_full_ordering() {
        let account = BurrowAccountView {
            account_id: "agent.near".into(),
            supplied: vec![],
            collateral: vec![balance(
                "a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.factory.bridge.near",
                1_000_000,
            )],
            borrowed: vec![balance("wrap.near", 3 * 10u128.pow(24))],
        };

        let plan = plan_unwind(2 * 10u128.pow(24), Some(&account), 10u128.pow(24));
        assert_eq!(plan.len(), 4);
        assert!(matches!(plan[0], UnwindStep::Unstake { .. }));
        assert!(matches!(plan[1], UnwindStep::Repay { token: Token::WNear, .. }));
        assert!(matches!(plan[2], UnwindStep::Withdraw { token: Token::Usdc, .. }));
        assert!(matches!(plan[3], UnwindStep::Unwrap { .. }));
    }

    #[test]
    fn test_unwind_skips_empty_and_unknown() {
        let account = BurrowAccountView {
            account_id: "agent.near".into(),
            supplied: vec![],
            collateral: vec![balance("mystery-token.near", 999)],
            borrowed: vec![balance("wrap.near", 0)],
        };

        // Zero balances, unknown tokens, and empty phases produce no steps
        let plan = plan_unwind(0, Some(&account), 0);
        assert!(plan.is_empty());
    }
}
