//! USD price oracle
//!
//! Fetches token prices from CoinGecko with a per-instance TTL cache.
//! The cache is owned by the oracle the caller constructs — there is no
//! process-wide price state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{Error, Result};
use crate::market::tokens::Token;

/// CoinGecko id for a token
fn coingecko_id(token: Token) -> &'static str {
    match token {
        Token::Near | Token::WNear => "near",
        Token::Usdc => "usd-coin",
        Token::Usdt => "tether",
        Token::StNear => "staked-near",
        Token::Aurora => "aurora-near",
        Token::Wbtc => "wrapped-bitcoin",
        Token::Weth => "weth",
    }
}

/// In-memory price cache with TTL, keyed by token
struct PriceCache {
    ttl: Duration,
    entries: HashMap<Token, (f64, Instant)>,
}

impl PriceCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    fn get(&self, token: Token) -> Option<f64> {
        let (value, stored_at) = self.entries.get(&token)?;
        if stored_at.elapsed() < self.ttl {
            Some(*value)
        } else {
            None
        }
    }

    fn set(&mut self, token: Token, value: f64) {
        self.entries.insert(token, (value, Instant::now()));
    }
}

/// USD price oracle over CoinGecko
pub struct PriceOracle {
    http: reqwest::Client,
    api_url: String,
    cache: RwLock<PriceCache>,
}

impl PriceOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::PriceFeed(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.price_api_url.clone(),
            cache: RwLock::new(PriceCache::new(Duration::from_secs(config.cache_ttl_secs))),
        })
    }

    /// USD prices for the given tokens.
    ///
    /// Feed failures degrade rather than fail: cached values are used
    /// while fresh, stablecoins fall back to 1.0, and NEAR/wNEAR mirror
    /// each other. Tokens the feed cannot price are absent from the map.
    pub async fn prices_usd(&self, tokens: &[Token]) -> HashMap<Token, f64> {
        let mut prices = HashMap::new();
        let mut to_fetch = Vec::new();

        {
            let cache = self.cache.read().await;
            for &token in tokens {
                match cache.get(token) {
                    Some(price) => {
                        prices.insert(token, price);
                    }
                    None => to_fetch.push(token),
                }
            }
        }

        if !to_fetch.is_empty() {
            match self.fetch(&to_fetch).await {
                Ok(fetched) => {
                    let mut cache = self.cache.write().await;
                    for (token, price) in fetched {
                        cache.set(token, price);
                        prices.insert(token, price);
                    }
                }
                Err(e) => warn!("Price feed unavailable: {}", e),
            }
        }

        // Stablecoins fall back to parity when the feed omits them
        for &token in tokens {
            if token.is_stable() {
                prices.entry(token).or_insert(1.0);
            }
        }

        // NEAR and wNEAR are the same asset
        if let Some(&near) = prices.get(&Token::Near) {
            prices.entry(Token::WNear).or_insert(near);
        } else if let Some(&wnear) = prices.get(&Token::WNear) {
            prices.insert(Token::Near, wnear);
        }

        prices
    }

    /// USD prices for every supported token
    pub async fn all_prices_usd(&self) -> HashMap<Token, f64> {
        self.prices_usd(&Token::ALL).await
    }

    /// The NEAR/USD price, or 0.0 when unavailable
    pub async fn near_usd(&self) -> f64 {
        self.prices_usd(&[Token::Near])
            .await
            .get(&Token::Near)
            .copied()
            .unwrap_or(0.0)
    }

    async fn fetch(&self, tokens: &[Token]) -> Result<Vec<(Token, f64)>> {
        let ids: Vec<&str> = {
            let mut ids: Vec<&str> = tokens.iter().map(|&t| coingecko_id(t)).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        debug!(?ids, "Fetching prices");

        let resp = self
            .http
            .get(&self.api_url)
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".into())])
            .send()
            .await
            .map_err(|e| Error::PriceFeed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::PriceFeed(format!("HTTP {} from price feed", resp.status())));
        }

        let data: HashMap<String, HashMap<String, f64>> = resp
            .json()
            .await
            .map_err(|e| Error::PriceFeed(e.to_string()))?;

        let mut result = Vec::new();
        for &token in tokens {
            if let Some(price) = data.get(coingecko_id(token)).and_then(|p| p.get("usd")) {
                result.push((token, *price));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_oracle(ttl_secs: u64) -> PriceOracle {
        let config = OracleConfig {
            // Unroutable address: any fetch attempt fails fast
            price_api_url: "http://127.0.0.1:1/simple/price".into(),
            timeout_ms: 100,
            cache_ttl_secs: ttl_secs,
        };
        PriceOracle::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_stablecoin_fallback_without_feed() {
        let oracle = test_oracle(60);
        let prices = oracle.prices_usd(&[Token::Usdc, Token::Usdt, Token::Wbtc]).await;

        assert_eq!(prices.get(&Token::Usdc), Some(&1.0));
        assert_eq!(prices.get(&Token::Usdt), Some(&1.0));
        // Non-stable token with no feed stays unpriced
        assert!(!prices.contains_key(&Token::Wbtc));
    }

    #[tokio::test]
    async fn test_cache_serves_within_ttl() {
        let oracle = test_oracle(60);
        oracle.cache.write().await.set(Token::Near, 3.5);

        let prices = oracle.prices_usd(&[Token::Near]).await;
        assert_eq!(prices.get(&Token::Near), Some(&3.5));
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let oracle = test_oracle(0);
        oracle.cache.write().await.set(Token::Near, 3.5);

        // TTL of zero: the entry is immediately stale, and the dead feed
        // cannot refresh it
        let prices = oracle.prices_usd(&[Token::Near]).await;
        assert!(!prices.contains_key(&Token::Near));
    }

    #[tokio::test]
    async fn test_wnear_mirrors_near() {
        let oracle = test_oracle(60);
        oracle.cache.write().await.set(Token::Near, 4.2);

        let prices = oracle.prices_usd(&[Token::Near, Token::WNear]).await;
        assert_eq!(prices.get(&Token::WNear), Some(&4.2));
    }
}
