//! Transaction building and submission
//!
//! Builds, signs, and submits transactions. The nonce and reference block
//! hash are fetched fresh for every submission — the chain rejects stale
//! block anchors, and reusing a nonce after an unknown outcome produces a
//! rejected transaction, not a duplicate.

use serde_json::Value;
use tracing::{debug, info};

use crate::chain::codec::{decode_block_hash, Action, SignedTransaction, Transaction, DEFAULT_GAS};
use crate::chain::rpc::NearRpcClient;
use crate::error::{Error, Result};
use crate::wallet::keys::Credentials;
use crate::wallet::signer::sign_transaction;

/// Receipt for a confirmed submission
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub tx_hash: String,
}

/// Builds and submits transactions for one account
pub struct TransactionBuilder<'a> {
    credentials: &'a Credentials,
    rpc: &'a NearRpcClient,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(credentials: &'a Credentials, rpc: &'a NearRpcClient) -> Self {
        Self { credentials, rpc }
    }

    pub fn account_id(&self) -> &str {
        &self.credentials.account_id
    }

    pub fn rpc(&self) -> &NearRpcClient {
        self.rpc
    }

    /// Next nonce for this account's access key
    async fn fresh_nonce(&self) -> Result<u64> {
        let key_info = self
            .rpc
            .view_access_key(
                &self.credentials.account_id,
                &self.credentials.public_key_str(),
            )
            .await?;
        Ok(key_info.nonce + 1)
    }

    /// Latest final block hash as the freshness anchor
    async fn fresh_block_hash(&self) -> Result<[u8; 32]> {
        let block = self.rpc.get_block().await?;
        decode_block_hash(&block.header.hash)
    }

    /// Build, serialize, and sign a transaction. Returns the signed
    /// transaction ready for broadcast.
    pub async fn build_and_sign(
        &self,
        receiver_id: &str,
        actions: Vec<Action>,
    ) -> Result<SignedTransaction> {
        if actions.is_empty() {
            return Err(Error::TransactionBuild("No actions to sign".into()));
        }

        let nonce = self.fresh_nonce().await?;
        let block_hash = self.fresh_block_hash().await?;

        let tx = Transaction {
            signer_id: self.credentials.account_id.clone(),
            public_key: self.credentials.public_key_bytes(),
            nonce,
            receiver_id: receiver_id.to_string(),
            block_hash,
            actions,
        };

        debug!(receiver = receiver_id, nonce, "Signing transaction");
        Ok(sign_transaction(&self.credentials.signing_key, &tx))
    }

    /// Build, sign, and submit a transaction, waiting for execution.
    ///
    /// A failed on-chain execution is an error; the transaction was still
    /// consumed by the chain, so callers must not resubmit.
    pub async fn sign_and_submit(
        &self,
        receiver_id: &str,
        actions: Vec<Action>,
    ) -> Result<SubmitReceipt> {
        let signed = self.build_and_sign(receiver_id, actions).await?;
        let outcome = self.rpc.broadcast_tx_commit(&signed.to_base64()).await?;

        if !outcome.status.is_success() {
            return Err(Error::TransactionSend(format!(
                "Transaction {} failed on-chain: {:?}",
                outcome.transaction.hash, outcome.status
            )));
        }

        info!(tx_hash = %outcome.transaction.hash, receiver = receiver_id, "Transaction executed");
        Ok(SubmitReceipt {
            tx_hash: outcome.transaction.hash,
        })
    }

    // ------------------------------------------------------------------
    // Convenience methods
    // ------------------------------------------------------------------

    /// Send native NEAR to another account
    pub async fn transfer(&self, receiver_id: &str, amount_yocto: u128) -> Result<SubmitReceipt> {
        self.sign_and_submit(
            receiver_id,
            vec![Action::Transfer {
                deposit: amount_yocto,
            }],
        )
        .await
    }

    /// Call a state-changing function on a contract
    pub async fn function_call(
        &self,
        contract_id: &str,
        method: &str,
        args: &Value,
        gas: u64,
        deposit: u128,
    ) -> Result<SubmitReceipt> {
        let action = Action::function_call_json(method, args, gas, deposit)?;
        self.sign_and_submit(contract_id, vec![action]).await
    }

    /// Call a function with the default 30 TGas budget and no deposit
    pub async fn simple_call(&self, contract_id: &str, method: &str, args: &Value) -> Result<SubmitReceipt> {
        self.function_call(contract_id, method, args, DEFAULT_GAS, 0)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[tokio::test]
    async fn test_empty_actions_rejected() {
        let credentials = Credentials {
            account_id: "agent.near".into(),
            signing_key: SigningKey::from_bytes(&[1u8; 32]),
        };
        let rpc = NearRpcClient::new(&crate::config::RpcConfig::default()).unwrap();
        let builder = TransactionBuilder::new(&credentials, &rpc);

        let err = builder.build_and_sign("wrap.near", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::TransactionBuild(_)));
    }
}
