//! NEAR DeFi Agent Library
//!
//! Transaction-execution core for an autonomous on-chain DeFi agent:
//! byte-exact transaction encoding and signing, a persisted guardrail
//! engine gating every mutating action, and workflow orchestration with
//! an append-only audit trail.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod market;
pub mod portfolio;
pub mod protocols;
pub mod strategy;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use guardrail::{Guardrails, Verb, Violation};
pub use strategy::Orchestrator;
