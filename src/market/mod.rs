//! Token registry and price data

pub mod oracle;
pub mod tokens;

pub use oracle::PriceOracle;
pub use tokens::Token;
