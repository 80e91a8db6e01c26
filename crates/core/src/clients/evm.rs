use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, JsonRpcError, Middleware, MiddlewareError, Provider},
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, TransactionReceipt, TransactionRequest, U64},
};
use routerctl_types::{Address, Bytes, ChainFamily, H256};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChainClient, ClientError, TxReceipt, TxRequest};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// JSON-RPC codes providers use for overload and rate limiting.
const TRANSIENT_CODES: [i64; 3] = [-32005, -32603, 429];
const TRANSIENT_MESSAGES: [&str; 8] = [
    "header not found",
    "rate limit",
    "limit exceeded",
    "too many requests",
    "timeout",
    "timed out",
    "429",
    "503",
];

fn classify_response(response: &JsonRpcError) -> ClientError {
    let mut message = response.message.clone();
    if let Some(data) = &response.data {
        message.push_str(&format!(" ({data})"));
    }
    let lowercase = response.message.to_lowercase();
    if response.code == 3 || lowercase.contains("revert") {
        return ClientError::CallReverted(message);
    }
    if TRANSIENT_CODES.contains(&response.code)
        || TRANSIENT_MESSAGES
            .iter()
            .any(|pattern| lowercase.contains(pattern))
    {
        return ClientError::Transport(message);
    }
    ClientError::Rejected(message)
}

/// Maps an ethers middleware error onto the client taxonomy. Reverts,
/// provider overload and other node refusals are told apart by the JSON-RPC
/// error code and message.
pub(super) fn classify<E: MiddlewareError>(err: E) -> ClientError {
    if let Some(response) = err.as_error_response() {
        return classify_response(response);
    }
    if let Some(err) = err.as_serde_error() {
        return ClientError::Malformed(err.to_string());
    }
    ClientError::Transport(err.to_string())
}

pub(super) fn receipt_outcome(
    tx_hash: H256,
    receipt: TransactionReceipt,
) -> Result<TxReceipt, ClientError> {
    if receipt.status != Some(U64::one()) {
        return Err(ClientError::Reverted {
            tx_hash,
            reason: None,
        });
    }
    Ok(TxReceipt {
        tx_hash,
        block_number: receipt.block_number.map(|number| number.as_u64()),
    })
}

pub(super) fn wallet_from_key(key: &SecretString, chain_id: u64) -> anyhow::Result<LocalWallet> {
    let wallet: LocalWallet = key.expose_secret().trim().parse()?;
    Ok(wallet.with_chain_id(chain_id))
}

/// JSON-RPC client for standard EVM chains.
#[derive(Debug, Clone)]
pub struct EvmRpcClient {
    provider: Provider<Http>,
    signer: SignerMiddleware<Provider<Http>, LocalWallet>,
    confirmations: usize,
    tx_timeout: Duration,
}

impl EvmRpcClient {
    pub fn new(
        rpc_url: &Url,
        chain_id: u64,
        private_key: &SecretString,
        confirmations: usize,
        tx_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())?.interval(POLL_INTERVAL);
        let wallet = wallet_from_key(private_key, chain_id)?;
        let signer = SignerMiddleware::new(provider.clone(), wallet);
        Ok(Self {
            provider,
            signer,
            confirmations,
            tx_timeout,
        })
    }

    pub(super) fn provider(&self) -> &Provider<Http> {
        &self.provider
    }

    pub(super) fn wallet(&self) -> &LocalWallet {
        self.signer.signer()
    }

    pub(super) fn tx_timeout(&self) -> Duration {
        self.tx_timeout
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn sender(&self) -> Address {
        self.signer.address()
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.sender())
            .to(to)
            .data(data)
            .into();
        self.provider.call(&tx, None).await.map_err(classify)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ClientError> {
        self.provider
            .get_code(address, None)
            .await
            .map_err(classify)
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<TxReceipt, ClientError> {
        if !tx.factory_deps.is_empty() {
            return Err(ClientError::Rejected(
                "factory dependencies are only supported on zkSync chains".to_owned(),
            ));
        }
        let request = TransactionRequest::new()
            .to(tx.to)
            .data(tx.data)
            .value(tx.value);
        let pending = self
            .signer
            .send_transaction(request, None)
            .await
            .map_err(classify)?;
        let tx_hash = pending.tx_hash();
        tracing::debug!("sent transaction {tx_hash:?}, waiting for inclusion");

        let receipt = tokio::time::timeout(
            self.tx_timeout,
            pending.confirmations(self.confirmations),
        )
        .await
        .map_err(|_| ClientError::Timeout(tx_hash))?
        .map_err(classify)?
        .ok_or_else(|| {
            ClientError::Transport(format!("transaction {tx_hash:?} was dropped"))
        })?;
        receipt_outcome(tx_hash, receipt)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ethers::providers::{HttpClientError, ProviderError};
    use test_casing::test_casing;

    use super::*;

    fn rpc_error(code: i64, message: &str) -> ProviderError {
        ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.to_owned(),
            data: None,
        })))
    }

    #[test_casing(5, [
        (-32005, "daily request count exceeded, request rate limited"),
        (-32000, "header not found"),
        (-32603, "internal error"),
        (-32000, "429 Too Many Requests"),
        (-32001, "upstream request timeout"),
    ])]
    fn overloaded_node_is_transient(code: i64, message: &str) {
        assert_matches!(classify(rpc_error(code, message)), ClientError::Transport(_));
    }

    #[test_casing(3, [
        (3, "execution reverted: Ownable: caller is not the owner"),
        (-32000, "execution reverted"),
        (-32015, "VM execution error: Reverted 0x"),
    ])]
    fn reverts_are_recognized(code: i64, message: &str) {
        assert_matches!(classify(rpc_error(code, message)), ClientError::CallReverted(_));
    }

    #[test]
    fn other_errors() {
        assert_matches!(
            classify(rpc_error(-32000, "insufficient funds for gas * price + value")),
            ClientError::Rejected(_)
        );
        let data = JsonRpcError {
            code: 3,
            message: "execution reverted".to_owned(),
            data: Some(serde_json::json!("0x08c379a0")),
        };
        assert_matches!(
            classify_response(&data),
            ClientError::CallReverted(message) if message.ends_with("(\"0x08c379a0\")")
        );

        let serde_err = serde_json::from_str::<u64>("\"not a number\"").unwrap_err();
        assert_matches!(
            classify(ProviderError::SerdeJson(serde_err)),
            ClientError::Malformed(_)
        );
        assert_matches!(
            classify(ProviderError::CustomError("connection refused".to_owned())),
            ClientError::Transport(message) if message.contains("connection refused")
        );
    }
}
