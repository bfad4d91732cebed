//! Supported token registry
//!
//! A closed set of assets the agent is willing to touch. Anything outside
//! this enum is unrepresentable, so "unknown token" is a compile-time
//! question rather than a runtime lookup failure.

use serde::{Deserialize, Serialize};

/// Yocto units per NEAR
pub const NEAR_DECIMALS: u32 = 24;

/// Tokens the agent recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Near,
    WNear,
    Usdc,
    Usdt,
    StNear,
    Aurora,
    Wbtc,
    Weth,
}

impl Token {
    /// All supported tokens, in registry order
    pub const ALL: [Token; 8] = [
        Token::Near,
        Token::WNear,
        Token::Usdc,
        Token::Usdt,
        Token::StNear,
        Token::Aurora,
        Token::Wbtc,
        Token::Weth,
    ];

    /// NEP-141 contract account, or None for the native token
    pub fn contract(&self) -> Option<&'static str> {
        match self {
            Token::Near => None,
            Token::WNear => Some("wrap.near"),
            Token::Usdc => Some("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.factory.bridge.near"),
            Token::Usdt => Some("dac17f958d2ee523a2206206994597c13d831ec7.factory.bridge.near"),
            Token::StNear => Some("meta-pool.near"),
            Token::Aurora => Some("aaaaaa20d9e0e2461697782ef11675f668207961.factory.bridge.near"),
            Token::Wbtc => Some("2260fac5e5542a773aa44fbcfedf7c193bc2c599.factory.bridge.near"),
            Token::Weth => Some("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2.factory.bridge.near"),
        }
    }

    /// Smallest-unit decimals
    pub fn decimals(&self) -> u32 {
        match self {
            Token::Near | Token::WNear | Token::StNear => 24,
            Token::Usdc | Token::Usdt => 6,
            Token::Aurora | Token::Weth => 18,
            Token::Wbtc => 8,
        }
    }

    /// Display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Near => "NEAR",
            Token::WNear => "WNEAR",
            Token::Usdc => "USDC",
            Token::Usdt => "USDT",
            Token::StNear => "STNEAR",
            Token::Aurora => "AURORA",
            Token::Wbtc => "WBTC",
            Token::Weth => "WETH",
        }
    }

    /// Reverse-lookup a token by its contract account
    pub fn from_contract(contract: &str) -> Option<Token> {
        Token::ALL
            .iter()
            .copied()
            .find(|t| t.contract() == Some(contract))
    }

    /// Lookup a token by its display symbol
    pub fn from_symbol(symbol: &str) -> Option<Token> {
        Token::ALL.iter().copied().find(|t| t.symbol() == symbol)
    }

    /// True for stablecoins (USD price fallback of 1.0)
    pub fn is_stable(&self) -> bool {
        matches!(self, Token::Usdc | Token::Usdt)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Convert a human-readable amount to raw smallest units.
///
/// Precise to 6 decimal places of the human amount, which is finer than
/// any amount the strategy layer produces (it rounds to 4).
pub fn human_to_raw(human: f64, decimals: u32) -> u128 {
    let micro = (human * 1e6).round().max(0.0) as u128;
    if decimals >= 6 {
        micro * 10u128.pow(decimals - 6)
    } else {
        micro / 10u128.pow(6 - decimals)
    }
}

/// Convert raw smallest units to a human-readable amount
pub fn raw_to_human(raw: u128, decimals: u32) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Convert NEAR to yoctoNEAR
pub fn near_to_yocto(amount: f64) -> u128 {
    human_to_raw(amount, NEAR_DECIMALS)
}

/// Convert yoctoNEAR to NEAR
pub fn yocto_to_near(yocto: u128) -> f64 {
    raw_to_human(yocto, NEAR_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_roundtrip() {
        for token in Token::ALL {
            if let Some(contract) = token.contract() {
                assert_eq!(Token::from_contract(contract), Some(token));
            }
        }
        assert_eq!(Token::from_contract("unknown.near"), None);
    }

    #[test]
    fn test_symbol_roundtrip() {
        for token in Token::ALL {
            assert_eq!(Token::from_symbol(token.symbol()), Some(token));
        }
        assert_eq!(Token::from_symbol("DOGE"), None);
    }

    #[test]
    fn test_near_conversions() {
        assert_eq!(near_to_yocto(1.0), 10u128.pow(24));
        assert_eq!(near_to_yocto(0.5), 5 * 10u128.pow(23));
        assert!((yocto_to_near(10u128.pow(24)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_low_decimal_conversion() {
        // USDC has 6 decimals
        assert_eq!(human_to_raw(1.5, 6), 1_500_000);
        assert_eq!(human_to_raw(0.000001, 6), 1);
        assert!((raw_to_human(1_500_000, 6) - 1.5).abs() < 1e-9);
    }
}
