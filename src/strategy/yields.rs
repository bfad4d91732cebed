//! Yield comparison and allocation engine
//!
//! Collects yield opportunities across Meta Pool staking and Burrow
//! lending, then turns them into allocation recommendations. The
//! allocator itself is a pure function of the supplied opportunity data,
//! the caller's risk tolerance, and the available liquid balance.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::tx::TransactionBuilder;
use crate::guardrail::Verb;
use crate::market::tokens::Token;
use crate::protocols::lending::Burrow;
use crate::protocols::staking::MetaPool;

/// Yield venues the engine compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    MetaPool,
    BurrowSupply,
    BurrowBorrow,
}

impl Protocol {
    /// Only staking and collateral supply are ever auto-executed; anything
    /// else is reported for visibility only.
    pub fn executable_verb(&self) -> Option<Verb> {
        match self {
            Protocol::MetaPool => Some(Verb::Stake),
            Protocol::BurrowSupply => Some(Verb::Supply),
            Protocol::BurrowBorrow => None,
        }
    }
}

/// Qualitative risk tier, ordered low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse(s: &str) -> Option<RiskLevel> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// A yield-bearing opportunity. Recomputed on every query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct YieldOpportunity {
    pub protocol: Protocol,
    pub token: Token,
    /// Annual percentage yield; negative for a borrowing cost
    pub apy_pct: f64,
    pub risk_level: RiskLevel,
    pub description: String,
    /// Minimum meaningful amount
    pub min_amount: f64,
}

/// A recommended portfolio allocation action
#[derive(Debug, Clone, Serialize)]
pub struct AllocationRecommendation {
    pub action: Verb,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    pub token: Token,
    /// Human-readable amount
    pub amount: f64,
    pub reason: String,
    pub expected_apy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
}

impl AllocationRecommendation {
    fn hold(amount: f64, reason: &str) -> Self {
        Self {
            action: Verb::Hold,
            protocol: None,
            token: Token::Near,
            amount,
            reason: reason.to_string(),
            expected_apy: 0.0,
            risk: None,
        }
    }
}

/// Yield comparison report
#[derive(Debug, Clone, Serialize)]
pub struct YieldReport {
    pub timestamp: String,
    pub opportunities: Vec<YieldOpportunity>,
    pub count: usize,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Allocate a liquid balance across the eligible opportunities.
///
/// A fixed gas buffer is reserved first. The remainder goes 60% to the
/// top-ranked eligible opportunity and 30% to the second if one exists;
/// the final 10% plus the gas buffer is reported as a liquid-reserve hold.
/// Opportunities above the caller's risk tolerance, and anything with a
/// non-positive yield (borrowing costs), are never selected.
pub fn recommend_allocation(
    opportunities: &[YieldOpportunity],
    available_near: f64,
    risk_tolerance: RiskLevel,
    gas_reserve_near: f64,
) -> Vec<AllocationRecommendation> {
    let deployable = (available_near - gas_reserve_near).max(0.0);
    if deployable <= 0.0 {
        return vec![AllocationRecommendation::hold(
            available_near,
            &format!(
                "Insufficient NEAR balance (need >{} NEAR for gas reserve)",
                gas_reserve_near
            ),
        )];
    }

    let eligible: Vec<&YieldOpportunity> = opportunities
        .iter()
        .filter(|o| o.risk_level <= risk_tolerance && o.apy_pct > 0.0)
        .collect();

    if eligible.is_empty() {
        return vec![AllocationRecommendation::hold(
            available_near,
            "No yield opportunities match risk tolerance",
        )];
    }

    let mut recommendations = Vec::new();
    for (i, pct) in [0.6, 0.3].iter().enumerate() {
        let Some(opp) = eligible.get(i) else { break };
        let Some(verb) = opp.protocol.executable_verb() else {
            continue;
        };
        recommendations.push(AllocationRecommendation {
            action: verb,
            protocol: Some(opp.protocol),
            token: opp.token,
            amount: round4(deployable * pct),
            reason: opp.description.clone(),
            expected_apy: opp.apy_pct,
            risk: Some(opp.risk_level),
        });
    }

    let reserved = deployable * 0.1;
    recommendations.push(AllocationRecommendation::hold(
        round4(reserved + gas_reserve_near),
        "Liquid reserve (gas + opportunistic deployment)",
    ));

    recommendations
}

/// Collects yield data from the protocols
pub struct YieldEngine<'a> {
    meta_pool: MetaPool<'a>,
    burrow: Burrow<'a>,
}

impl<'a> YieldEngine<'a> {
    pub fn new(builder: &'a TransactionBuilder<'a>) -> Self {
        Self {
            meta_pool: MetaPool::new(builder),
            burrow: Burrow::new(builder),
        }
    }

    /// Net Meta Pool staking APY: the base NEAR PoS yield less the pool's
    /// reward fee. Falls back to a conservative estimate when the contract
    /// state is unavailable.
    pub async fn staking_apy(&self) -> f64 {
        const BASE_STAKING_APY: f64 = 5.0;
        const FALLBACK_APY: f64 = 4.5;

        match self.meta_pool.contract_state().await {
            Ok(Some(state)) => {
                let fee_pct = state.reward_fee_bp as f64 / 100.0;
                let net = BASE_STAKING_APY * (1.0 - fee_pct / 100.0);
                (net * 100.0).round() / 100.0
            }
            _ => FALLBACK_APY,
        }
    }

    /// Collect all yield opportunities, sorted by APY descending
    pub async fn all_opportunities(&self) -> Vec<YieldOpportunity> {
        let mut opportunities = Vec::new();

        let staking_apy = self.staking_apy().await;
        if staking_apy > 0.0 {
            opportunities.push(YieldOpportunity {
                protocol: Protocol::MetaPool,
                token: Token::Near,
                apy_pct: staking_apy,
                risk_level: RiskLevel::Low,
                description: format!(
                    "Liquid staking via Meta Pool: NEAR -> stNEAR at ~{}% APY",
                    staking_apy
                ),
                min_amount: 1.0,
            });
        }

        match self.burrow.get_assets_paged(0, 30).await {
            Ok(assets) => {
                for (token_id, asset) in assets {
                    let Some(token) = Token::from_contract(&token_id) else {
                        continue;
                    };
                    let supply_apy = (asset.supply_apy_pct() * 100.0).round() / 100.0;
                    let borrow_apy = (asset.borrow_apy_pct() * 100.0).round() / 100.0;

                    if supply_apy > 0.0 {
                        opportunities.push(YieldOpportunity {
                            protocol: Protocol::BurrowSupply,
                            token,
                            apy_pct: supply_apy,
                            risk_level: RiskLevel::Medium,
                            description: format!("Supply {} on Burrow: {}% APY", token, supply_apy),
                            min_amount: 0.1,
                        });
                    }
                    if borrow_apy > 0.0 {
                        opportunities.push(YieldOpportunity {
                            protocol: Protocol::BurrowBorrow,
                            token,
                            apy_pct: -borrow_apy,
                            risk_level: RiskLevel::High,
                            description: format!("Borrow {} on Burrow: {}% cost", token, borrow_apy),
                            min_amount: 0.1,
                        });
                    }
                }
            }
            Err(e) => debug!("Burrow rates unavailable: {}", e),
        }

        opportunities.sort_by(|a, b| b.apy_pct.partial_cmp(&a.apy_pct).unwrap());
        opportunities
    }

    /// Yield comparison report
    pub async fn report(&self) -> YieldReport {
        let opportunities = self.all_opportunities().await;
        YieldReport {
            timestamp: Utc::now().to_rfc3339(),
            count: opportunities.len(),
            opportunities,
        }
    }
}
