use std::time::Duration;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    StatusCode,
};
use routerctl_types::{Address, Bytes, ChainFamily, TronAddress, H256, U256};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use super::{
    evm::wallet_from_key, ChainClient, ClientError, CreateRequest, TxReceipt, TxRequest,
};

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";
const POLL_INTERVAL: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Energy the deployer pays for when the caller of a new contract runs out.
const ORIGIN_ENERGY_LIMIT: u64 = 10_000_000;

/// Client for the java-tron HTTP API (TronGrid compatible).
///
/// Transactions are built by the node (`triggersmartcontract`), checked
/// against their id, signed locally and broadcast.
#[derive(Debug, Clone)]
pub struct TronHttpClient {
    http: reqwest::Client,
    base_url: Url,
    wallet: LocalWallet,
    fee_limit: u64,
    /// Query the solidity node for receipts, i.e. wait for finality.
    solidified: bool,
    tx_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct TriggerRequest {
    owner_address: String,
    contract_address: String,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_value: Option<u64>,
    visible: bool,
}

#[derive(Debug, Serialize)]
struct DeployRequest {
    owner_address: String,
    abi: String,
    bytecode: String,
    name: String,
    fee_limit: u64,
    call_value: u64,
    consume_user_resource_percent: u8,
    origin_energy_limit: u64,
    visible: bool,
}

#[derive(Debug, Serialize)]
struct ValueRequest {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResult {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    code: Option<String>,
    /// Hex encoded UTF-8.
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    #[serde(default)]
    result: ApiResult,
    #[serde(default)]
    constant_result: Vec<String>,
    #[serde(default)]
    transaction: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ContractInfo {
    #[serde(default)]
    runtimecode: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    block_number: Option<u64>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    res_message: Option<String>,
    #[serde(default)]
    receipt: InfoReceipt,
    #[serde(default)]
    contract_result: Vec<String>,
    /// Hex-41 address of a contract created by the transaction.
    #[serde(default)]
    contract_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InfoReceipt {
    #[serde(default)]
    result: Option<String>,
}

/// Tron messages are hex encoded text; fall back to the raw string.
fn decode_message(message: &str) -> String {
    hex::decode(message)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| message.to_owned())
}

fn hex41(address: Address) -> String {
    TronAddress::from_canonical(address).to_hex()
}

impl ApiResult {
    fn into_error(self) -> ClientError {
        let message = self
            .message
            .as_deref()
            .map(decode_message)
            .unwrap_or_default();
        match self.code.as_deref() {
            Some("CONTRACT_EXE_ERROR") => ClientError::CallReverted(message),
            _ if message.contains("REVERT") => ClientError::CallReverted(message),
            Some(code) => ClientError::Rejected(format!("{code}: {message}")),
            None => ClientError::Rejected(message),
        }
    }
}

impl TransactionInfo {
    fn is_success(&self) -> bool {
        match self.receipt.result.as_deref() {
            Some(result) => result == "SUCCESS",
            None => self.result.as_deref() != Some("FAILED"),
        }
    }

    fn failure_reason(&self) -> Option<String> {
        if let Some(message) = &self.res_message {
            return Some(decode_message(message));
        }
        let status = self.receipt.result.clone();
        match self.contract_result.first().filter(|output| !output.is_empty()) {
            Some(output) => Some(format!("{} (output 0x{output})", status.unwrap_or_default())),
            None => status,
        }
    }

    fn created_contract(&self) -> Option<Address> {
        let address: TronAddress = self.contract_address.as_deref()?.parse().ok()?;
        Some(address.canonical())
    }
}

impl TronHttpClient {
    pub fn new(
        base_url: Url,
        chain_id: u64,
        private_key: &SecretString,
        api_key: Option<&SecretString>,
        fee_limit: u64,
        confirmations: usize,
        tx_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key {
            let mut value = HeaderValue::from_str(api_key.expose_secret())?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            wallet: wallet_from_key(private_key, chain_id)?,
            fee_limit,
            solidified: confirmations > 1,
            tx_timeout,
        })
    }

    async fn post<T, R>(&self, path: &str, body: &T) -> Result<R, ClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| ClientError::Transport(format!("invalid endpoint {path}: {err}")))?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::Transport(format!("{path} answered {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected(format!("{path} answered {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|err| ClientError::Malformed(format!("{path}: {err}")))
    }

    fn trigger_request(&self, to: Address, data: &Bytes, value: Option<u64>) -> TriggerRequest {
        TriggerRequest {
            owner_address: hex41(self.sender()),
            contract_address: hex41(to),
            data: hex::encode(data),
            fee_limit: value.map(|_| self.fee_limit),
            call_value: value,
            visible: false,
        }
    }

    fn sign(&self, mut transaction: Value) -> Result<(H256, Value), ClientError> {
        let tx_id = transaction
            .get("txID")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Malformed("transaction without txID".to_owned()))?;
        let raw_data = transaction
            .get("raw_data_hex")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Malformed("transaction without raw_data_hex".to_owned()))?;

        let tx_id: H256 = tx_id
            .parse()
            .map_err(|err| ClientError::Malformed(format!("txID `{tx_id}`: {err}")))?;
        let raw_data = hex::decode(raw_data)
            .map_err(|err| ClientError::Malformed(format!("raw_data_hex: {err}")))?;
        // The node built the transaction; make sure the id we sign commits to it.
        let digest: [u8; 32] = Sha256::digest(&raw_data).into();
        if H256(digest) != tx_id {
            return Err(ClientError::Malformed(format!(
                "txID {tx_id:?} does not match the transaction body"
            )));
        }

        let signature = self
            .wallet
            .sign_hash(tx_id)
            .map_err(|err| ClientError::Signing(err.to_string()))?;
        transaction["signature"] = Value::Array(vec![Value::String(hex::encode(
            signature.to_vec(),
        ))]);
        Ok((tx_id, transaction))
    }

    async fn wait_for_info(&self, tx_id: H256) -> Result<TransactionInfo, ClientError> {
        let path = if self.solidified {
            "walletsolidity/gettransactioninfobyid"
        } else {
            "wallet/gettransactioninfobyid"
        };
        let request = ValueRequest {
            value: hex::encode(tx_id.as_bytes()),
            visible: None,
        };
        let started = tokio::time::Instant::now();
        loop {
            let info: TransactionInfo = self.post(path, &request).await?;
            if info.id.is_some() {
                return Ok(info);
            }
            if started.elapsed() >= self.tx_timeout {
                return Err(ClientError::Timeout(tx_id));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Broadcasts a signed transaction and waits until it executed successfully.
    async fn submit(
        &self,
        tx_id: H256,
        signed: Value,
    ) -> Result<(TxReceipt, TransactionInfo), ClientError> {
        let broadcast: BroadcastResponse = self
            .post("wallet/broadcasttransaction", &signed)
            .await?;
        if !broadcast.result {
            let message = broadcast
                .message
                .as_deref()
                .map(decode_message)
                .unwrap_or_default();
            return match broadcast.code.as_deref() {
                Some("SERVER_BUSY") | Some("NOT_ENOUGH_EFFECTIVE_CONNECTION") => {
                    Err(ClientError::Transport(message))
                }
                code => Err(ClientError::Rejected(format!(
                    "{}: {message}",
                    code.unwrap_or("broadcast failed")
                ))),
            };
        }
        tracing::debug!("broadcast Tron transaction {tx_id:?}, waiting for inclusion");

        let info = self.wait_for_info(tx_id).await?;
        if !info.is_success() {
            return Err(ClientError::Reverted {
                tx_hash: tx_id,
                reason: info.failure_reason(),
            });
        }
        let receipt = TxReceipt {
            tx_hash: tx_id,
            block_number: info.block_number,
        };
        Ok((receipt, info))
    }
}

#[async_trait]
impl ChainClient for TronHttpClient {
    fn family(&self) -> ChainFamily {
        ChainFamily::Tron
    }

    fn sender(&self) -> Address {
        self.wallet.address()
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let request = self.trigger_request(to, &data, None);
        let response: TriggerResponse = self
            .post("wallet/triggerconstantcontract", &request)
            .await?;
        if !response.result.result {
            return Err(response.result.into_error());
        }
        let reverted = response
            .transaction
            .as_ref()
            .and_then(|tx| tx.pointer("/ret/0/ret"))
            .and_then(Value::as_str)
            == Some("REVERT");
        if reverted {
            return Err(ClientError::CallReverted(format!(
                "call to {} reverted",
                TronAddress::from_canonical(to)
            )));
        }
        let output = response.constant_result.first().ok_or_else(|| {
            ClientError::Malformed("triggerconstantcontract returned no result".to_owned())
        })?;
        hex::decode(output)
            .map(Bytes::from)
            .map_err(|err| ClientError::Malformed(format!("constant_result: {err}")))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ClientError> {
        let request = ValueRequest {
            value: hex41(address),
            visible: Some(false),
        };
        let info: ContractInfo = self.post("wallet/getcontractinfo", &request).await?;
        hex::decode(&info.runtimecode)
            .map(Bytes::from)
            .map_err(|err| ClientError::Malformed(format!("runtimecode: {err}")))
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<TxReceipt, ClientError> {
        if !tx.factory_deps.is_empty() {
            return Err(ClientError::Rejected(
                "factory dependencies are only supported on zkSync chains".to_owned(),
            ));
        }
        if tx.value > U256::from(u64::MAX) {
            return Err(ClientError::Rejected(format!(
                "call value {} does not fit into a Tron amount",
                tx.value
            )));
        }

        let request = self.trigger_request(tx.to, &tx.data, Some(tx.value.low_u64()));
        let response: TriggerResponse = self
            .post("wallet/triggersmartcontract", &request)
            .await?;
        if !response.result.result {
            return Err(response.result.into_error());
        }
        let transaction = response.transaction.ok_or_else(|| {
            ClientError::Malformed("triggersmartcontract returned no transaction".to_owned())
        })?;
        let (tx_id, signed) = self.sign(transaction)?;

        self.submit(tx_id, signed).await.map(|(receipt, _)| receipt)
    }

    async fn create_contract(
        &self,
        request: CreateRequest,
    ) -> Result<(TxReceipt, Address), ClientError> {
        let body = DeployRequest {
            owner_address: hex41(self.sender()),
            abi: request.abi,
            bytecode: hex::encode(&request.creation_code),
            name: request.contract,
            fee_limit: self.fee_limit,
            call_value: 0,
            consume_user_resource_percent: 100,
            origin_energy_limit: ORIGIN_ENERGY_LIMIT,
            visible: false,
        };
        let transaction: Value = self.post("wallet/deploycontract", &body).await?;
        if let Some(error) = transaction.get("Error").and_then(Value::as_str) {
            return Err(ClientError::Rejected(error.to_owned()));
        }
        let (tx_id, signed) = self.sign(transaction)?;
        let (receipt, info) = self.submit(tx_id, signed).await?;
        let address = info.created_contract().ok_or_else(|| {
            ClientError::Malformed(format!("transaction {tx_id:?} reports no created contract"))
        })?;
        Ok((receipt, address))
    }
}
