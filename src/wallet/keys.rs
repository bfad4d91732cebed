//! Account credential loading and key parsing
//!
//! Credentials come from NEAR_ACCOUNT_ID + NEAR_PRIVATE_KEY environment
//! variables first, falling back to a JSON credential file. The file must
//! not be group- or world-readable.

use std::path::Path;

use ed25519_dalek::SigningKey;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// On-disk credential file shape
#[derive(Debug, Deserialize)]
struct AccountFile {
    account_id: String,
    private_key: String,
}

/// Loaded account credentials
#[derive(Debug)]
pub struct Credentials {
    pub account_id: String,
    pub signing_key: SigningKey,
}

impl Credentials {
    /// Load credentials from environment variables, falling back to the
    /// account JSON file.
    pub fn load(account_file: &Path) -> Result<Self> {
        if let (Ok(account_id), Ok(raw_key)) = (
            std::env::var("NEAR_ACCOUNT_ID"),
            std::env::var("NEAR_PRIVATE_KEY"),
        ) {
            debug!("Loading credentials from environment");
            return Ok(Self {
                account_id,
                signing_key: parse_secret_key(&raw_key)?,
            });
        }

        if !account_file.exists() {
            return Err(Error::Config(format!(
                "Account file not found: {} (set NEAR_ACCOUNT_ID and NEAR_PRIVATE_KEY, \
                 or create the file)",
                account_file.display()
            )));
        }

        check_permissions(account_file)?;

        let content = std::fs::read_to_string(account_file)
            .map_err(|e| Error::Config(format!("Failed to read account file: {}", e)))?;
        let parsed: AccountFile = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse account file: {}", e)))?;

        debug!(account_id = %parsed.account_id, "Loaded credentials from file");

        Ok(Self {
            account_id: parsed.account_id,
            signing_key: parse_secret_key(&parsed.private_key)?,
        })
    }

    /// Raw 32-byte public key
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public key in NEAR display format (ed25519:base58)
    pub fn public_key_str(&self) -> String {
        encode_public_key(&self.public_key_bytes())
    }
}

/// Parse a NEAR ed25519 secret key string into a signing key.
///
/// Accepts the `ed25519:` prefix, then base58: 64 bytes (seed + public
/// key, keypair export format) or 32 bytes (seed only). Any other length
/// is a hard error — key material is never padded or truncated.
pub fn parse_secret_key(raw: &str) -> Result<SigningKey> {
    let raw = raw.strip_prefix("ed25519:").unwrap_or(raw);
    let bytes = bs58::decode(raw)
        .into_vec()
        .map_err(|e| Error::InvalidKey(format!("Invalid base58 key: {}", e)))?;

    let seed: [u8; 32] = match bytes.len() {
        64 => bytes[..32].try_into().unwrap(),
        32 => bytes.as_slice().try_into().unwrap(),
        n => {
            return Err(Error::InvalidKey(format!(
                "Unexpected key length: {} (expected 32 or 64 bytes)",
                n
            )))
        }
    };

    Ok(SigningKey::from_bytes(&seed))
}

/// Parse a NEAR ed25519 public key string into raw bytes
pub fn parse_public_key(raw: &str) -> Result<[u8; 32]> {
    let raw = raw.strip_prefix("ed25519:").unwrap_or(raw);
    let bytes = bs58::decode(raw)
        .into_vec()
        .map_err(|e| Error::InvalidKey(format!("Invalid base58 key: {}", e)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidKey(format!("Public key must be 32 bytes, got {}", bytes.len())))
}

/// Encode a raw public key in NEAR display format
pub fn encode_public_key(bytes: &[u8; 32]) -> String {
    format!("ed25519:{}", bs58::encode(bytes).into_string())
}

/// A freshly generated implicit account.
///
/// The account id is the hex of the public key; the account comes alive
/// on mainnet when it receives its first deposit.
pub struct GeneratedAccount {
    pub account_id: String,
    pub private_key: String,
    pub public_key: String,
}

/// Generate an ED25519 keypair and derive the implicit account id
pub fn generate_implicit_account() -> GeneratedAccount {
    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let public_bytes = signing_key.verifying_key().to_bytes();

    // Keypair export format: seed (32) + public key (32), base58
    let mut full_key = signing_key.to_bytes().to_vec();
    full_key.extend_from_slice(&public_bytes);

    GeneratedAccount {
        account_id: hex::encode(public_bytes),
        private_key: format!("ed25519:{}", bs58::encode(full_key).into_string()),
        public_key: encode_public_key(&public_bytes),
    }
}

/// Write a generated account to a credential file with owner-only
/// permissions. Refuses to overwrite an existing file.
pub fn write_account_file(account: &GeneratedAccount, path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Config(format!(
            "{} already exists. Remove it first to regenerate.",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Cannot create {}: {}", parent.display(), e)))?;
    }

    let content = serde_json::json!({
        "account_id": account.account_id,
        "private_key": account.private_key,
    });
    std::fs::write(path, serde_json::to_vec_pretty(&content)?)
        .map_err(|e| Error::Config(format!("Cannot write {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Config(format!("Cannot set permissions: {}", e)))?;
    }

    Ok(())
}

/// Refuse to use a credential file readable by group or others
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::InsecureCredentials(format!(
                    "{} has insecure permissions {:o}. Run 'chmod 600 {}'",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}
