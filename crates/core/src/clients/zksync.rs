use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    abi::{self, Token},
    providers::Middleware,
    signers::LocalWallet,
    types::{BlockNumber, Signature},
    utils::{keccak256, rlp::RlpStream},
};
use routerctl_types::{Address, Bytes, ChainFamily, H256, U256};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    evm::{classify, receipt_outcome},
    ChainClient, ClientError, EvmRpcClient, TxReceipt, TxRequest,
};
use crate::create2::zksync_bytecode_hash;

pub(crate) const EIP712_TX_TYPE: u8 = 0x71;
/// Default pubdata price limit used by zkSync SDKs.
const DEFAULT_GAS_PER_PUBDATA: u64 = 50_000;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const TRANSACTION_TYPE: &str = "Transaction(uint256 txType,uint256 from,uint256 to,uint256 gasLimit,uint256 gasPerPubdataByteLimit,uint256 maxFeePerGas,uint256 maxPriorityFeePerGas,uint256 paymaster,uint256 nonce,uint256 value,bytes data,bytes32[] factoryDeps,bytes paymasterInput)";
const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId)";

/// Client for zkSync-style chains.
///
/// Plain calls and transactions go through the Ethereum JSON-RPC surface.
/// Transactions carrying factory dependencies (deployments) are sent as
/// EIP-712 transactions.
#[derive(Debug, Clone)]
pub struct ZkSyncClient {
    inner: EvmRpcClient,
    chain_id: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Eip712Meta {
    gas_per_pubdata: U256,
    factory_deps: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeeEstimateRequest {
    from: Address,
    to: Address,
    data: Bytes,
    value: U256,
    #[serde(rename = "type")]
    transaction_type: U256,
    eip712_meta: Eip712Meta,
}

/// Response of `zks_estimateFee`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fee {
    gas_limit: U256,
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
    gas_per_pubdata_limit: U256,
}

/// Unsigned EIP-712 transaction without a paymaster.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Eip712Transaction {
    pub from: Address,
    pub to: Address,
    pub nonce: U256,
    pub gas_limit: U256,
    pub gas_per_pubdata: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub value: U256,
    pub data: Bytes,
    pub factory_deps: Vec<Bytes>,
}

fn address_word(address: Address) -> Token {
    Token::Uint(U256::from_big_endian(address.as_bytes()))
}

impl Eip712Transaction {
    fn struct_hash(&self) -> Result<H256, ClientError> {
        let mut dep_hashes = Vec::with_capacity(self.factory_deps.len() * 32);
        for dep in &self.factory_deps {
            let hash = zksync_bytecode_hash(dep)
                .map_err(|err| ClientError::Rejected(format!("invalid factory dependency: {err}")))?;
            dep_hashes.extend_from_slice(hash.as_bytes());
        }
        let encoded = abi::encode(&[
            Token::FixedBytes(keccak256(TRANSACTION_TYPE).to_vec()),
            Token::Uint(EIP712_TX_TYPE.into()),
            address_word(self.from),
            address_word(self.to),
            Token::Uint(self.gas_limit),
            Token::Uint(self.gas_per_pubdata),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            // paymaster
            Token::Uint(U256::zero()),
            Token::Uint(self.nonce),
            Token::Uint(self.value),
            Token::FixedBytes(keccak256(&self.data).to_vec()),
            Token::FixedBytes(keccak256(&dep_hashes).to_vec()),
            // paymasterInput
            Token::FixedBytes(keccak256(b"").to_vec()),
        ]);
        Ok(H256(keccak256(encoded)))
    }

    fn domain_separator(chain_id: u64) -> H256 {
        let encoded = abi::encode(&[
            Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
            Token::FixedBytes(keccak256("zkSync").to_vec()),
            Token::FixedBytes(keccak256("2").to_vec()),
            Token::Uint(chain_id.into()),
        ]);
        H256(keccak256(encoded))
    }

    /// Digest the sender signs.
    pub fn signing_hash(&self, chain_id: u64) -> Result<H256, ClientError> {
        let mut message = Vec::with_capacity(66);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(Self::domain_separator(chain_id).as_bytes());
        message.extend_from_slice(self.struct_hash()?.as_bytes());
        Ok(H256(keccak256(message)))
    }

    /// Raw transaction bytes accepted by `eth_sendRawTransaction`.
    pub fn encode_signed(&self, chain_id: u64, signature: &Signature) -> Bytes {
        let parity = if signature.v >= 27 {
            signature.v - 27
        } else {
            signature.v
        };

        let mut rlp = RlpStream::new();
        rlp.begin_unbounded_list();
        rlp.append(&self.nonce);
        rlp.append(&self.max_priority_fee_per_gas);
        rlp.append(&self.max_fee_per_gas);
        rlp.append(&self.gas_limit);
        rlp.append(&self.to);
        rlp.append(&self.value);
        rlp.append(&self.data.to_vec());
        rlp.append(&parity);
        rlp.append(&signature.r);
        rlp.append(&signature.s);
        rlp.append(&chain_id);
        rlp.append(&self.from);
        rlp.append(&self.gas_per_pubdata);
        rlp.begin_list(self.factory_deps.len());
        for dep in &self.factory_deps {
            rlp.append(&dep.to_vec());
        }
        // No custom signature; the node rebuilds it from (v, r, s).
        rlp.append(&"");
        // No paymaster.
        rlp.begin_list(0);
        rlp.finalize_unbounded_list();

        let mut raw = vec![EIP712_TX_TYPE];
        raw.extend_from_slice(&rlp.out());
        raw.into()
    }
}

impl ZkSyncClient {
    pub fn new(
        rpc_url: &Url,
        chain_id: u64,
        private_key: &SecretString,
        confirmations: usize,
        tx_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            inner: EvmRpcClient::new(rpc_url, chain_id, private_key, confirmations, tx_timeout)?,
            chain_id,
        })
    }

    fn wallet(&self) -> &LocalWallet {
        self.inner.wallet()
    }

    async fn estimate_fee(&self, tx: &TxRequest) -> Result<Fee, ClientError> {
        let request = FeeEstimateRequest {
            from: self.sender(),
            to: tx.to,
            data: tx.data.clone(),
            value: tx.value,
            transaction_type: EIP712_TX_TYPE.into(),
            eip712_meta: Eip712Meta {
                gas_per_pubdata: DEFAULT_GAS_PER_PUBDATA.into(),
                factory_deps: tx.factory_deps.iter().map(|dep| dep.to_vec()).collect(),
            },
        };
        self.inner
            .provider()
            .request("zks_estimateFee", [request])
            .await
            .map_err(classify)
    }

    async fn send_eip712(&self, tx: TxRequest) -> Result<TxReceipt, ClientError> {
        let provider = self.inner.provider();
        let fee = self.estimate_fee(&tx).await?;
        let nonce = provider
            .get_transaction_count(self.sender(), Some(BlockNumber::Pending.into()))
            .await
            .map_err(classify)?;

        let transaction = Eip712Transaction {
            from: self.sender(),
            to: tx.to,
            nonce,
            gas_limit: fee.gas_limit,
            gas_per_pubdata: fee.gas_per_pubdata_limit,
            max_fee_per_gas: fee.max_fee_per_gas,
            max_priority_fee_per_gas: fee.max_priority_fee_per_gas,
            value: tx.value,
            data: tx.data,
            factory_deps: tx.factory_deps,
        };
        let digest = transaction.signing_hash(self.chain_id)?;
        let signature = self
            .wallet()
            .sign_hash(digest)
            .map_err(|err| ClientError::Signing(err.to_string()))?;
        let raw = transaction.encode_signed(self.chain_id, &signature);

        let pending = provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify)?;
        let tx_hash = pending.tx_hash();
        tracing::debug!("sent EIP-712 transaction {tx_hash:?}, waiting for inclusion");
        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt, ClientError> {
        let provider = self.inner.provider();
        let started = tokio::time::Instant::now();
        loop {
            let receipt = provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(classify)?;
            // zkSync reports pending transactions with an empty block number.
            if let Some(receipt) = receipt.filter(|receipt| receipt.block_number.is_some()) {
                return receipt_outcome(tx_hash, receipt);
            }
            if started.elapsed() >= self.inner.tx_timeout() {
                return Err(ClientError::Timeout(tx_hash));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ChainClient for ZkSyncClient {
    fn family(&self) -> ChainFamily {
        ChainFamily::ZkFactory
    }

    fn sender(&self) -> Address {
        self.inner.sender()
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        self.inner.call(to, data).await
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ClientError> {
        self.inner.get_code(address).await
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<TxReceipt, ClientError> {
        if tx.factory_deps.is_empty() {
            self.inner.send_transaction(tx).await
        } else {
            self.send_eip712(tx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use ethers::{signers::Signer, utils::rlp::Rlp};

    use super::*;

    fn wallet() -> LocalWallet {
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap()
    }

    fn transaction(from: Address) -> Eip712Transaction {
        Eip712Transaction {
            from,
            to: Address::repeat_byte(0x80),
            nonce: 7.into(),
            gas_limit: 3_000_000.into(),
            gas_per_pubdata: DEFAULT_GAS_PER_PUBDATA.into(),
            max_fee_per_gas: 250_000_000.into(),
            max_priority_fee_per_gas: 0.into(),
            value: 0.into(),
            data: vec![0xde, 0xad].into(),
            factory_deps: vec![vec![0u8; 32].into()],
        }
    }

    #[test]
    fn signature_recovers_the_sender() {
        let wallet = wallet();
        let tx = transaction(wallet.address());
        let digest = tx.signing_hash(324).unwrap();
        let signature = wallet.sign_hash(digest).unwrap();
        assert_eq!(signature.recover(digest).unwrap(), wallet.address());

        // The chain id is part of the domain.
        assert_ne!(digest, tx.signing_hash(280).unwrap());
    }

    #[test]
    fn factory_deps_are_committed_to() {
        let tx = transaction(Address::repeat_byte(1));
        let mut other = tx.clone();
        other.factory_deps = vec![vec![1u8; 32].into()];
        assert_ne!(tx.signing_hash(324).unwrap(), other.signing_hash(324).unwrap());

        other.factory_deps = vec![vec![1u8; 64].into()];
        assert!(other.signing_hash(324).is_err());
    }

    #[test]
    fn signed_encoding_layout() {
        let wallet = wallet();
        let tx = transaction(wallet.address());
        let signature = wallet.sign_hash(tx.signing_hash(324).unwrap()).unwrap();
        let raw = tx.encode_signed(324, &signature);
        assert_eq!(raw[0], EIP712_TX_TYPE);

        let rlp = Rlp::new(&raw[1..]);
        assert_eq!(rlp.item_count().unwrap(), 16);
        let nonce: U256 = rlp.val_at(0).unwrap();
        assert_eq!(nonce, 7.into());
        let to: Address = rlp.val_at(4).unwrap();
        assert_eq!(to, tx.to);
        let parity: u64 = rlp.val_at(7).unwrap();
        assert!(parity <= 1);
        let chain_id: u64 = rlp.val_at(10).unwrap();
        assert_eq!(chain_id, 324);
        let from: Address = rlp.val_at(11).unwrap();
        assert_eq!(from, wallet.address());
        assert_eq!(rlp.at(13).unwrap().item_count().unwrap(), 1);
    }
}
