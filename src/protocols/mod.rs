//! DeFi protocol contract templates

pub mod lending;
pub mod staking;

pub use lending::Burrow;
pub use staking::{MetaPool, WNear};
