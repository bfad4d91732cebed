//! Burrow lending/borrowing integration
//!
//! Contract: contract.main.burrow.near
//!
//! Supply and repay go through ft_transfer_call on the token contract with
//! an Execute msg; borrow and withdraw call execute on Burrow directly.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chain::codec::{ONE_YOCTO, TGAS};
use crate::chain::tx::{SubmitReceipt, TransactionBuilder};
use crate::error::{Error, Result};
use crate::market::tokens::Token;

/// Burrow main contract
pub const BURROW: &str = "contract.main.burrow.near";

const GAS_100T: u64 = 100 * TGAS;
const GAS_300T: u64 = 300 * TGAS;

/// Burrow storage registration deposit (0.25 NEAR)
const BURROW_STORAGE_DEPOSIT: u128 = 250_000_000_000_000_000_000_000;

/// One balance entry in a Burrow account (supplied, collateral, borrowed)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurrowBalanceView {
    pub token_id: String,
    pub balance: String,
    #[serde(default)]
    pub shares: String,
}

impl BurrowBalanceView {
    pub fn balance_raw(&self) -> u128 {
        self.balance.parse().unwrap_or(0)
    }

    /// The supported token behind this entry, if any
    pub fn token(&self) -> Option<Token> {
        Token::from_contract(&self.token_id)
    }
}

/// Burrow account state: positions per token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurrowAccountView {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub supplied: Vec<BurrowBalanceView>,
    #[serde(default)]
    pub collateral: Vec<BurrowBalanceView>,
    #[serde(default)]
    pub borrowed: Vec<BurrowBalanceView>,
}

impl BurrowAccountView {
    pub fn has_borrows(&self) -> bool {
        self.borrowed.iter().any(|b| b.balance_raw() > 0)
    }

    /// Health factor = total collateral value / total borrowed value.
    ///
    /// Burrow reports balances already adjusted for collateral factors.
    /// Infinite when nothing is borrowed; below 1.0 means liquidation
    /// eligibility.
    pub fn health_factor(&self) -> f64 {
        let total_borrowed: f64 = self.borrowed.iter().map(|b| b.balance_raw() as f64).sum();
        if total_borrowed == 0.0 {
            return f64::INFINITY;
        }
        let total_collateral: f64 = self.collateral.iter().map(|c| c.balance_raw() as f64).sum();
        total_collateral / total_borrowed
    }
}

/// Per-asset rates we consume from get_assets_paged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BurrowAssetView {
    #[serde(default)]
    pub supply_apr: String,
    #[serde(default)]
    pub borrow_apr: String,
}

impl BurrowAssetView {
    /// APR decimal string (e.g. "0.05") to a percentage
    fn apr_pct(raw: &str) -> f64 {
        raw.parse::<f64>().map(|v| v * 100.0).unwrap_or(0.0)
    }

    pub fn supply_apy_pct(&self) -> f64 {
        Self::apr_pct(&self.supply_apr)
    }

    pub fn borrow_apy_pct(&self) -> f64 {
        Self::apr_pct(&self.borrow_apr)
    }
}

fn contract_of(token: Token) -> Result<&'static str> {
    token.contract().ok_or_else(|| {
        Error::Config(format!("{} is the native token; wrap it before using Burrow", token))
    })
}

/// Burrow lending protocol operations
pub struct Burrow<'a> {
    builder: &'a TransactionBuilder<'a>,
}

impl<'a> Burrow<'a> {
    pub fn new(builder: &'a TransactionBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Supply tokens as collateral via ft_transfer_call
    pub async fn supply(&self, token: Token, amount_raw: u128) -> Result<SubmitReceipt> {
        let token_contract = contract_of(token)?;
        let amount = amount_raw.to_string();
        let msg = serde_json::to_string(&json!({
            "Execute": { "actions": [
                { "IncreaseCollateral": { "token_id": token_contract, "max_amount": amount } }
            ]}
        }))?;

        self.builder
            .function_call(
                token_contract,
                "ft_transfer_call",
                &json!({ "receiver_id": BURROW, "amount": amount, "msg": msg }),
                GAS_300T,
                ONE_YOCTO,
            )
            .await
    }

    /// Borrow tokens against collateral
    pub async fn borrow(&self, token: Token, amount_raw: u128) -> Result<SubmitReceipt> {
        let token_contract = contract_of(token)?;
        self.builder
            .function_call(
                BURROW,
                "execute",
                &json!({ "actions": [
                    { "Borrow": { "token_id": token_contract, "amount": amount_raw.to_string() } }
                ]}),
                GAS_300T,
                ONE_YOCTO,
            )
            .await
    }

    /// Repay borrowed tokens via ft_transfer_call
    pub async fn repay(&self, token: Token, amount_raw: u128) -> Result<SubmitReceipt> {
        let token_contract = contract_of(token)?;
        let amount = amount_raw.to_string();
        let msg = serde_json::to_string(&json!({
            "Execute": { "actions": [
                { "Repay": { "token_id": token_contract, "max_amount": amount } }
            ]}
        }))?;

        self.builder
            .function_call(
                token_contract,
                "ft_transfer_call",
                &json!({ "receiver_id": BURROW, "amount": amount, "msg": msg }),
                GAS_300T,
                ONE_YOCTO,
            )
            .await
    }

    /// Withdraw supplied collateral
    pub async fn withdraw(&self, token: Token, amount_raw: u128) -> Result<SubmitReceipt> {
        let token_contract = contract_of(token)?;
        self.builder
            .function_call(
                BURROW,
                "execute",
                &json!({ "actions": [
                    { "DecreaseCollateral": { "token_id": token_contract, "amount": amount_raw.to_string() } }
                ]}),
                GAS_300T,
                ONE_YOCTO,
            )
            .await
    }

    /// Burrow account info (positions)
    pub async fn get_account(&self) -> Result<Option<BurrowAccountView>> {
        let result = self
            .builder
            .rpc()
            .view_function(
                BURROW,
                "get_account",
                Some(&json!({ "account_id": self.builder.account_id() })),
            )
            .await?;
        match result {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Rates for a single asset
    pub async fn get_asset(&self, token: Token) -> Result<Option<BurrowAssetView>> {
        let token_contract = contract_of(token)?;
        let result = self
            .builder
            .rpc()
            .view_function(BURROW, "get_asset", Some(&json!({ "token_id": token_contract })))
            .await?;
        match result {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Paginated asset list with supply/borrow rates
    pub async fn get_assets_paged(
        &self,
        from_index: u32,
        limit: u32,
    ) -> Result<Vec<(String, BurrowAssetView)>> {
        let result = self
            .builder
            .rpc()
            .view_function(
                BURROW,
                "get_assets_paged",
                Some(&json!({ "from_index": from_index, "limit": limit })),
            )
            .await?;
        match result {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Register storage on Burrow if not already registered
    pub async fn ensure_storage(&self) -> Result<SubmitReceipt> {
        self.builder
            .function_call(
                BURROW,
                "storage_deposit",
                &json!({}),
                GAS_100T,
                BURROW_STORAGE_DEPOSIT,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with(collateral: &[(&str, u128)], borrowed: &[(&str, u128)]) -> BurrowAccountView {
        let entry = |(token_id, balance): &(&str, u128)| BurrowBalanceView {
            token_id: token_id.to_string(),
            balance: balance.to_string(),
            shares: String::new(),
        };
        BurrowAccountView {
            account_id: "agent.near".into(),
            supplied: vec![],
            collateral: collateral.iter().map(entry).collect(),
            borrowed: borrowed.iter().map(entry).collect(),
        }
    }

    #[test]
    fn test_health_factor_no_borrows() {
        let account = account_with(&[("wrap.near", 100)], &[]);
        assert!(account.health_factor().is_infinite());
        assert!(!account.has_borrows());
    }

    #[test]
    fn test_health_factor_ratio() {
        let account = account_with(&[("wrap.near", 150)], &[("wrap.near", 100)]);
        assert!((account.health_factor() - 1.5).abs() < 1e-9);
        assert!(account.has_borrows());
    }

    #[test]
    fn test_balance_token_lookup() {
        let entry = BurrowBalanceView {
            token_id: "wrap.near".into(),
            balance: "42".into(),
            shares: String::new(),
        };
        assert_eq!(entry.token(), Some(Token::WNear));
        assert_eq!(entry.balance_raw(), 42);

        let unknown = BurrowBalanceView {
            token_id: "mystery.near".into(),
            balance: "1".into(),
            shares: String::new(),
        };
        assert_eq!(unknown.token(), None);
    }

    #[test]
    fn test_asset_rates_parse() {
        let asset: BurrowAssetView = serde_json::from_value(json!({
            "supply_apr": "0.052",
            "borrow_apr": "0.081",
            "reserved": "123",
        }))
        .unwrap();
        assert!((asset.supply_apy_pct() - 5.2).abs() < 1e-9);
        assert!((asset.borrow_apy_pct() - 8.1).abs() < 1e-9);
    }

    #[test]
    fn test_assets_paged_tuple_shape() {
        let value = json!([
            ["wrap.near", { "supply_apr": "0.05", "borrow_apr": "0.07" }],
            ["meta-pool.near", { "supply_apr": "0.02", "borrow_apr": "0.00" }],
        ]);
        let parsed: Vec<(String, BurrowAssetView)> = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "wrap.near");
        assert!((parsed[1].1.supply_apy_pct() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_native_token_refused() {
        assert!(contract_of(Token::Near).is_err());
        assert!(contract_of(Token::WNear).is_ok());
    }
}
