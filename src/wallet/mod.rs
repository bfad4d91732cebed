//! Key management and signing

pub mod keys;
pub mod nep413;
pub mod signer;

pub use keys::Credentials;
pub use nep413::AuthToken;
