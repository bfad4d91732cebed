//! Chain wire format, RPC client, and transaction building

pub mod codec;
pub mod rpc;
pub mod tx;

pub use codec::{Action, Permission, SignedTransaction, Transaction};
pub use rpc::NearRpcClient;
pub use tx::TransactionBuilder;
