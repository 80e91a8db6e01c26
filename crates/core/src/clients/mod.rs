//! Transports to the chains the routers live on.
//!
//! Everything above this module works with canonical 20-byte addresses;
//! clients translate to the wire format of their chain.

use std::fmt;

use async_trait::async_trait;
use routerctl_types::{Address, Bytes, ChainFamily, H256, U256};

pub use self::{evm::EvmRpcClient, tron::TronHttpClient, zksync::ZkSyncClient};

mod evm;
#[cfg(any(test, feature = "testonly"))]
pub mod mock;
mod tron;
mod zksync;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The node could not be reached or answered with a transport level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered with an error that is not a revert.
    #[error("rejected by node: {0}")]
    Rejected(String),
    /// A read-only call or gas estimation executed and reverted.
    #[error("call reverted: {0}")]
    CallReverted(String),
    #[error("transaction {tx_hash:?} reverted{}", revert_suffix(.reason))]
    Reverted {
        tx_hash: H256,
        reason: Option<String>,
    },
    #[error("timed out waiting for transaction {0:?}")]
    Timeout(H256),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("malformed node response: {0}")]
    Malformed(String),
}

fn revert_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Bytecodes shipped alongside the transaction. Only zkSync-style
    /// chains accept them.
    pub factory_deps: Vec<Bytes>,
}

impl TxRequest {
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            ..Self::default()
        }
    }
}

/// Contract-creation transaction without a factory.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub contract: String,
    /// JSON ABI, which Tron nodes store alongside the contract.
    pub abi: String,
    /// Bytecode followed by the encoded constructor arguments.
    pub creation_code: Bytes,
}

/// Receipt of an included, successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
}

/// Minimal surface a chain has to offer to read and reconfigure routers.
#[async_trait]
pub trait ChainClient: 'static + Send + Sync + fmt::Debug {
    fn family(&self) -> ChainFamily;

    /// Account that signs the transactions.
    fn sender(&self) -> Address;

    /// Read-only contract call against the latest state.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError>;

    /// Runtime code at `address`. Empty if there is no contract.
    async fn get_code(&self, address: Address) -> Result<Bytes, ClientError>;

    /// Signs, submits and waits for inclusion. A reverted transaction is
    /// reported as [`ClientError::Reverted`].
    async fn send_transaction(&self, tx: TxRequest) -> Result<TxReceipt, ClientError>;

    /// Deploys with a contract-creation transaction. The chain assigns the
    /// address, which is returned with the receipt.
    async fn create_contract(
        &self,
        request: CreateRequest,
    ) -> Result<(TxReceipt, Address), ClientError> {
        Err(ClientError::Rejected(format!(
            "{} chains do not deploy {} with contract-creation transactions",
            self.family(),
            request.contract
        )))
    }
}
