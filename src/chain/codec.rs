//! Borsh wire format for NEAR transactions
//!
//! Hand-rolled, byte-exact serialization of transactions, actions, and
//! access-key permissions. All integers are little-endian; strings and
//! byte buffers carry a 4-byte length prefix; enums are a single tag byte
//! followed by the variant payload. Tag values are fixed by the protocol's
//! published enumeration order and must never be reordered — a mismatch
//! produces a transaction the network deserializes into the wrong variant.

use crate::error::{Error, Result};

/// One TGas
pub const TGAS: u64 = 1_000_000_000_000;

/// Default gas budget for a function call (30 TGas)
pub const DEFAULT_GAS: u64 = 30 * TGAS;

/// The 1-yoctoNEAR deposit required by ft_transfer and friends
pub const ONE_YOCTO: u128 = 1;

// Action enum variants, in protocol order. The full enumeration is
// CreateAccount=0, DeployContract=1, FunctionCall=2, Transfer=3, Stake=4,
// AddKey=5, DeleteKey=6, DeleteAccount=7; only the variants this client
// emits get named constants.
const ACTION_FUNCTION_CALL: u8 = 2;
const ACTION_TRANSFER: u8 = 3;
const ACTION_ADD_KEY: u8 = 5;
const ACTION_DELETE_KEY: u8 = 6;

// Permission enum variants
const PERMISSION_FUNCTION_CALL: u8 = 0;
const PERMISSION_FULL_ACCESS: u8 = 1;

// Key and signature type tags (ED25519 only)
const KEY_TYPE_ED25519: u8 = 0;
const SIGNATURE_TYPE_ED25519: u8 = 0;

/// Access-key permission
///
/// Scoped keys carry an optional spending allowance (None = unlimited), a
/// single receiver, and a method allowlist (empty = all methods on that
/// receiver). The chain decrements the allowance; the client never tracks
/// its decay locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    FunctionCall {
        allowance: Option<u128>,
        receiver_id: String,
        method_names: Vec<String>,
    },
    FullAccess,
}

/// A transaction action. Immutable once constructed; consumed exactly once
/// by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Transfer {
        deposit: u128,
    },
    FunctionCall {
        method_name: String,
        args: Vec<u8>,
        gas: u64,
        deposit: u128,
    },
    AddKey {
        public_key: [u8; 32],
        nonce: u64,
        permission: Permission,
    },
    DeleteKey {
        public_key: [u8; 32],
    },
}

impl Action {
    /// FunctionCall with JSON-encoded arguments
    pub fn function_call_json(
        method_name: &str,
        args: &serde_json::Value,
        gas: u64,
        deposit: u128,
    ) -> Result<Action> {
        let args = serde_json::to_vec(args)?;
        Ok(Action::FunctionCall {
            method_name: method_name.to_string(),
            args,
            gas,
            deposit,
        })
    }

    fn encode(&self, w: &mut Writer) {
        match self {
            Action::Transfer { deposit } => {
                w.u8(ACTION_TRANSFER);
                w.u128(*deposit);
            }
            Action::FunctionCall {
                method_name,
                args,
                gas,
                deposit,
            } => {
                w.u8(ACTION_FUNCTION_CALL);
                w.string(method_name);
                w.bytes(args);
                w.u64(*gas);
                w.u128(*deposit);
            }
            Action::AddKey {
                public_key,
                nonce,
                permission,
            } => {
                w.u8(ACTION_ADD_KEY);
                w.public_key(public_key);
                // Access key: nonce + permission
                w.u64(*nonce);
                match permission {
                    Permission::FullAccess => {
                        w.u8(PERMISSION_FULL_ACCESS);
                    }
                    Permission::FunctionCall {
                        allowance,
                        receiver_id,
                        method_names,
                    } => {
                        w.u8(PERMISSION_FUNCTION_CALL);
                        match allowance {
                            Some(a) => {
                                w.u8(1);
                                w.u128(*a);
                            }
                            None => w.u8(0),
                        }
                        w.string(receiver_id);
                        w.u32(method_names.len() as u32);
                        for name in method_names {
                            w.string(name);
                        }
                    }
                }
            }
            Action::DeleteKey { public_key } => {
                w.u8(ACTION_DELETE_KEY);
                w.public_key(public_key);
            }
        }
    }

    /// Canonical encoding of a single action
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

/// An unsigned transaction, ready for canonical encoding.
///
/// Serialized once, hashed, and signed; the encoded bytes are write-once
/// and never mutated after signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signer_id: String,
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub receiver_id: String,
    pub block_hash: [u8; 32],
    pub actions: Vec<Action>,
}

impl Transaction {
    /// Canonical Borsh encoding of the unsigned transaction
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.string(&self.signer_id);
        w.public_key(&self.public_key);
        w.u64(self.nonce);
        w.string(&self.receiver_id);
        // Block hash is 32 raw bytes, no length prefix
        w.raw(&self.block_hash);
        w.u32(self.actions.len() as u32);
        for action in &self.actions {
            action.encode(&mut w);
        }
        w.into_bytes()
    }
}

/// A signed transaction: the unsigned bytes followed by the signature
/// (algorithm tag + 64 bytes). Fully self-contained for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    tx_bytes: Vec<u8>,
    signature: [u8; 64],
}

impl SignedTransaction {
    pub fn new(tx_bytes: Vec<u8>, signature: [u8; 64]) -> Self {
        Self {
            tx_bytes,
            signature,
        }
    }

    /// Wire bytes: transaction + ED25519 signature tag + 64 signature bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.raw(&self.tx_bytes);
        w.u8(SIGNATURE_TYPE_ED25519);
        w.raw(&self.signature);
        w.into_bytes()
    }

    /// Base64 wire bytes, as accepted by the broadcast RPC methods
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }
}

/// Little-endian wire writer
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u128(&mut self, v: u128) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    /// Raw bytes, no length prefix (fixed-size fields)
    fn raw(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    /// Key type tag + 32 key bytes
    fn public_key(&mut self, key: &[u8; 32]) {
        self.u8(KEY_TYPE_ED25519);
        self.raw(key);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Decode a base58 block hash into the fixed 32-byte field
pub fn decode_block_hash(b58: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(b58)
        .into_vec()
        .map_err(|e| Error::Encoding(format!("Invalid block hash base58: {}", e)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Encoding(format!("Block hash must be 32 bytes, got {}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference reader used to verify the canonical encoding round-trips.
    struct Reader<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> Reader<'a> {
        fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0 }
        }

        fn take(&mut self, n: usize) -> &'a [u8] {
            let slice = &self.data[self.pos..self.pos + n];
            self.pos += n;
            slice
        }

        fn u8(&mut self) -> u8 {
            self.take(1)[0]
        }

        fn u32(&mut self) -> u32 {
            u32::from_le_bytes(self.take(4).try_into().unwrap())
        }

        fn u64(&mut self) -> u64 {
            u64::from_le_bytes(self.take(8).try_into().unwrap())
        }

        fn u128(&mut self) -> u128 {
            u128::from_le_bytes(self.take(16).try_into().unwrap())
        }

        fn string(&mut self) -> String {
            let len = self.u32() as usize;
            String::from_utf8(self.take(len).to_vec()).unwrap()
        }

        fn bytes(&mut self) -> Vec<u8> {
            let len = self.u32() as usize;
            self.take(len).to_vec()
        }

        fn key(&mut self) -> [u8; 32] {
            assert_eq!(self.u8(), KEY_TYPE_ED25519);
            self.take(32).try_into().unwrap()
        }

        fn action(&mut self) -> Action {
            match self.u8() {
                ACTION_TRANSFER => Action::Transfer {
                    deposit: self.u128(),
                },
                ACTION_FUNCTION_CALL => Action::FunctionCall {
                    method_name: self.string(),
                    args: self.bytes(),
                    gas: self.u64(),
                    deposit: self.u128(),
                },
                ACTION_ADD_KEY => {
                    let public_key = self.key();
                    let nonce = self.u64();
                    let permission = match self.u8() {
                        PERMISSION_FULL_ACCESS => Permission::FullAccess,
                        PERMISSION_FUNCTION_CALL => {
                            let allowance = match self.u8() {
                                1 => Some(self.u128()),
                                _ => None,
                            };
                            let receiver_id = self.string();
                            let count = self.u32() as usize;
                            let method_names = (0..count).map(|_| self.string()).collect();
                            Permission::FunctionCall {
                                allowance,
                                receiver_id,
                                method_names,
                            }
                        }
                        tag => panic!("unexpected permission tag {}", tag),
                    };
                    Action::AddKey {
                        public_key,
                        nonce,
                        permission,
                    }
                }
                ACTION_DELETE_KEY => Action::DeleteKey {
                    public_key: self.key(),
                },
                tag => panic!("unexpected action tag {}", tag),
            }
        }

        fn transaction(&mut self) -> Transaction {
            let signer_id = self.string();
            let public_key = self.key();
            let nonce = self.u64();
            let receiver_id = self.string();
            let block_hash: [u8; 32] = self.take(32).try_into().unwrap();
            let count = self.u32() as usize;
            let actions = (0..count).map(|_| self.action()).collect();
            Transaction {
                signer_id,
                public_key,
                nonce,
                receiver_id,
                block_hash,
                actions,
            }
        }
    }

    fn sample_actions() -> Vec<Action> {
        vec![
            Action::Transfer {
                deposit: 1_250_000_000_000_000_000_000_000,
            },
            Action::FunctionCall {
                method_name: "deposit_and_stake".into(),
                args: b"{}".to_vec(),
                gas: 200 * TGAS,
                deposit: near_amount(5),
            },
            Action::AddKey {
                public_key: [7u8; 32],
                nonce: 0,
                permission: Permission::FullAccess,
            },
            Action::AddKey {
                public_key: [9u8; 32],
                nonce: 42,
                permission: Permission::FunctionCall {
                    allowance: Some(near_amount(1)),
                    receiver_id: "contract.main.burrow.near".into(),
                    method_names: vec!["execute".into(), "storage_deposit".into()],
                },
            },
            Action::AddKey {
                public_key: [1u8; 32],
                nonce: 0,
                permission: Permission::FunctionCall {
                    allowance: None,
                    receiver_id: "wrap.near".into(),
                    method_names: vec![],
                },
            },
            Action::DeleteKey {
                public_key: [3u8; 32],
            },
        ]
    }

    fn near_amount(n: u128) -> u128 {
        n * 10u128.pow(24)
    }

    #[test]
    fn test_action_roundtrip_all_variants() {
        for action in sample_actions() {
            let bytes = action.to_bytes();
            let decoded = Reader::new(&bytes).action();
            assert_eq!(decoded, action);
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let tx = Transaction {
            signer_id: "agent.near".into(),
            public_key: [5u8; 32],
            nonce: 1234567,
            receiver_id: "meta-pool.near".into(),
            block_hash: [0xAB; 32],
            actions: sample_actions(),
        };

        let bytes = tx.to_bytes();
        let decoded = Reader::new(&bytes).transaction();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_encoding_deterministic() {
        let tx = Transaction {
            signer_id: "agent.near".into(),
            public_key: [5u8; 32],
            nonce: 99,
            receiver_id: "wrap.near".into(),
            block_hash: [1u8; 32],
            actions: sample_actions(),
        };

        assert_eq!(tx.to_bytes(), tx.clone().to_bytes());
    }

    #[test]
    fn test_transfer_wire_layout() {
        let action = Action::Transfer { deposit: 1 };
        let bytes = action.to_bytes();

        // Tag byte 3, then 16 little-endian amount bytes
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1], 1);
        assert!(bytes[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_string_length_prefix() {
        let action = Action::FunctionCall {
            method_name: "ab".into(),
            args: vec![],
            gas: 0,
            deposit: 0,
        };
        let bytes = action.to_bytes();

        // Tag, then u32 length 2, then "ab"
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..5], &[2, 0, 0, 0]);
        assert_eq!(&bytes[5..7], b"ab");
    }

    #[test]
    fn test_block_hash_no_length_prefix() {
        let tx = Transaction {
            signer_id: "a".into(),
            public_key: [0u8; 32],
            nonce: 0,
            receiver_id: "b".into(),
            block_hash: [0xCC; 32],
            actions: vec![],
        };
        let bytes = tx.to_bytes();

        // signer: 4+1, key: 1+32, nonce: 8, receiver: 4+1 -> hash at offset 51
        assert_eq!(&bytes[51..83], &[0xCC; 32]);
        // action count follows immediately
        assert_eq!(&bytes[83..87], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_signed_transaction_layout() {
        let tx_bytes = vec![1, 2, 3];
        let signed = SignedTransaction::new(tx_bytes.clone(), [0xEE; 64]);
        let bytes = signed.to_bytes();

        assert_eq!(&bytes[..3], &tx_bytes[..]);
        assert_eq!(bytes[3], 0); // ED25519 signature tag
        assert_eq!(&bytes[4..], &[0xEE; 64]);
    }

    #[test]
    fn test_decode_block_hash_length() {
        let ok = bs58::encode([9u8; 32]).into_string();
        assert_eq!(decode_block_hash(&ok).unwrap(), [9u8; 32]);

        let short = bs58::encode([9u8; 16]).into_string();
        assert!(decode_block_hash(&short).is_err());
    }
}
