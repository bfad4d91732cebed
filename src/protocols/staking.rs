//! Liquid staking via Meta Pool and wNEAR wrap/unwrap
//!
//! Contracts:
//!   - wrap.near: wNEAR (NEP-141 wrapped NEAR)
//!   - meta-pool.near: Meta Pool liquid staking (NEAR -> stNEAR)

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chain::codec::{ONE_YOCTO, TGAS};
use crate::chain::tx::{SubmitReceipt, TransactionBuilder};
use crate::error::Result;
use crate::market::tokens::{near_to_yocto, yocto_to_near};

/// wNEAR contract
pub const WRAP_NEAR: &str = "wrap.near";

/// Meta Pool contract
pub const META_POOL: &str = "meta-pool.near";

const GAS_30T: u64 = 30 * TGAS;
const GAS_200T: u64 = 200 * TGAS;

/// Minimum NEP-141 storage deposit on wrap.near (0.00125 NEAR)
const WNEAR_STORAGE_DEPOSIT: u128 = 1_250_000_000_000_000_000_000;

/// Staking account state returned by Meta Pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaPoolAccountView {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub unstaked_balance: String,
    #[serde(default)]
    pub staked_balance: String,
    #[serde(default)]
    pub can_withdraw: bool,
}

/// Meta Pool contract state fields we consume
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaPoolStateView {
    #[serde(default)]
    pub reward_fee_bp: u32,
}

/// wNEAR (wrap.near) operations
pub struct WNear<'a> {
    builder: &'a TransactionBuilder<'a>,
}

impl<'a> WNear<'a> {
    pub fn new(builder: &'a TransactionBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Wrap NEAR into wNEAR by depositing into near_deposit
    pub async fn wrap(&self, amount_near: f64) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                WRAP_NEAR,
                "near_deposit",
                &json!({}),
                GAS_30T,
                near_to_yocto(amount_near),
            )
            .await
    }

    /// Unwrap wNEAR back to native NEAR
    pub async fn unwrap(&self, amount_near: f64) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                WRAP_NEAR,
                "near_withdraw",
                &json!({ "amount": near_to_yocto(amount_near).to_string() }),
                GAS_30T,
                ONE_YOCTO,
            )
            .await
    }

    /// wNEAR balance in yocto units
    pub async fn balance(&self) -> Result<u128> {
        self.builder
            .rpc()
            .ft_balance_of(WRAP_NEAR, self.builder.account_id())
            .await
    }

    /// Register storage on wrap.near if not already registered
    pub async fn ensure_storage(&self) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                WRAP_NEAR,
                "storage_deposit",
                &json!({ "account_id": self.builder.account_id() }),
                GAS_30T,
                WNEAR_STORAGE_DEPOSIT,
            )
            .await
    }
}

/// Meta Pool liquid staking operations
pub struct MetaPool<'a> {
    builder: &'a TransactionBuilder<'a>,
}

impl<'a> MetaPool<'a> {
    pub fn new(builder: &'a TransactionBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Deposit NEAR and receive stNEAR at the current exchange rate
    pub async fn deposit_and_stake(&self, amount_near: f64) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                META_POOL,
                "deposit_and_stake",
                &json!({}),
                GAS_200T,
                near_to_yocto(amount_near),
            )
            .await
    }

    /// Instantly unstake stNEAR back to NEAR (small fee ~0.3%)
    pub async fn liquid_unstake(
        &self,
        stnear_amount: f64,
        min_expected_near: f64,
    ) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                META_POOL,
                "liquid_unstake",
                &json!({
                    "st_near_to_burn": near_to_yocto(stnear_amount).to_string(),
                    "min_expected_near": near_to_yocto(min_expected_near).to_string(),
                }),
                GAS_200T,
                ONE_YOCTO,
            )
            .await
    }

    /// Delayed unstake (2-3 epochs, no fee); collect with withdraw_unstaked
    pub async fn delayed_unstake(&self, stnear_amount: f64) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                META_POOL,
                "unstake",
                &json!({ "amount": near_to_yocto(stnear_amount).to_string() }),
                GAS_200T,
                ONE_YOCTO,
            )
            .await
    }

    /// Withdraw NEAR after a delayed unstake completes
    pub async fn withdraw_unstaked(&self) -> Result<SubmitReceipt> {
        self.builder
            .function_call(META_POOL, "withdraw_unstaked", &json!({}), GAS_200T, ONE_YOCTO)
            .await
    }

    /// Staking account info for the builder's account
    pub async fn get_account_info(&self) -> Result<Option<MetaPoolAccountView>> {
        let result = self
            .builder
            .rpc()
            .view_function(
                META_POOL,
                "get_account_info",
                Some(&json!({ "account_id": self.builder.account_id() })),
            )
            .await?;
        match result {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Current stNEAR/NEAR exchange rate
    pub async fn st_near_price(&self) -> Result<f64> {
        let result = self
            .builder
            .rpc()
            .view_function(META_POOL, "get_st_near_price", None)
            .await?;
        let price = result
            .and_then(|v| v.as_str().and_then(|s| s.parse::<u128>().ok()))
            .map(yocto_to_near)
            .unwrap_or(1.0);
        Ok(price)
    }

    /// Meta Pool contract state (fees, totals)
    pub async fn contract_state(&self) -> Result<Option<MetaPoolStateView>> {
        let result = self
            .builder
            .rpc()
            .view_function(META_POOL, "get_contract_state", None)
            .await?;
        match result {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// stNEAR balance for the builder's account
    pub async fn stnear_balance(&self) -> Result<u128> {
        self.builder
            .rpc()
            .ft_balance_of(META_POOL, self.builder.account_id())
            .await
    }
}
