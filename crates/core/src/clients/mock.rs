//! In-memory chain that understands the router, factory and ContractDeployer
//! ABIs. Failures can be scripted per call or per function.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use ethers::{
    abi::{self, Function, Token},
    utils::keccak256,
};
use routerctl_config::RouteVersion;
use routerctl_types::{
    Address, Bytes, ChainFamily, FeeParams, ReferrerMaxFee, H256, U256, FEE_DENOMINATOR,
};

use super::{ChainClient, ClientError, CreateRequest, TxReceipt, TxRequest};
use crate::{
    abi::{CONTRACT_DEPLOYER, DEPLOY_FACTORY, ROUTER},
    create2::{
        create2_address, zksync_bytecode_hash, zksync_create2_address, CONTRACT_DEPLOYER_ADDRESS,
    },
};

const PLACEHOLDER_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];
const NOT_OWNER: &str = "Ownable: caller is not the owner";

/// Router storage as seen through its getters.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRouter {
    pub version: RouteVersion,
    pub owner: Address,
    /// `None` makes the getter revert, as on routers predating fee managers.
    pub fee_manager: Option<Address>,
    pub wrapped_token: Option<Address>,
    pub bridge: Address,
    pub fee: FeeParams,
    /// `None` makes the v3 referrer getters revert.
    pub referrer: Option<ReferrerMaxFee>,
    pub approved: BTreeSet<Address>,
}

impl MockRouter {
    pub fn new(version: RouteVersion, owner: Address) -> Self {
        Self {
            version,
            owner,
            fee_manager: None,
            wrapped_token: None,
            bridge: Address::zero(),
            fee: FeeParams::default(),
            referrer: version.supports_referrer_fee().then(ReferrerMaxFee::default),
            approved: BTreeSet::new(),
        }
    }

    fn supports(&self, function: &str) -> bool {
        let v2_only = ["mosAddress", "setMosAddress", "feeRate", "fixedFee"];
        let v3_only = [
            "bridgeAddress",
            "setBridgeAddress",
            "routerFeeRate",
            "routerFixedFee",
            "maxFeeRate",
            "maxNativeFee",
            "setReferrerMaxFee",
        ];
        match self.version {
            RouteVersion::V2 => !v3_only.contains(&function),
            RouteVersion::V3 => !v2_only.contains(&function),
        }
    }
}

#[derive(Debug, Default)]
struct MockChainInner {
    code: HashMap<Address, Bytes>,
    routers: HashMap<Address, MockRouter>,
    views: HashMap<(Address, Bytes), Bytes>,
    /// Creation code prefix to the runtime code installed on deployment.
    runtimes: Vec<(Bytes, Bytes)>,
    sent: Vec<TxRequest>,
    call_count: usize,
    failing_calls: usize,
    rejected_reads: Option<(usize, String)>,
    failing_sends: usize,
    reverting: HashMap<String, String>,
    ignored: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct MockChain {
    family: ChainFamily,
    sender: Address,
    inner: Arc<RwLock<MockChainInner>>,
}

fn token_error(function: &str) -> ClientError {
    ClientError::Malformed(format!("unexpected arguments for {function}"))
}

fn address_arg(tokens: &[Token], index: usize, function: &str) -> Result<Address, ClientError> {
    tokens
        .get(index)
        .cloned()
        .and_then(Token::into_address)
        .ok_or_else(|| token_error(function))
}

fn uint_arg(tokens: &[Token], index: usize, function: &str) -> Result<U256, ClientError> {
    tokens
        .get(index)
        .cloned()
        .and_then(Token::into_uint)
        .ok_or_else(|| token_error(function))
}

fn bytes32_arg(tokens: &[Token], index: usize, function: &str) -> Result<H256, ClientError> {
    tokens
        .get(index)
        .cloned()
        .and_then(Token::into_fixed_bytes)
        .filter(|bytes| bytes.len() == 32)
        .map(|bytes| H256::from_slice(&bytes))
        .ok_or_else(|| token_error(function))
}

fn bytes_arg(tokens: &[Token], index: usize, function: &str) -> Result<Vec<u8>, ClientError> {
    tokens
        .get(index)
        .cloned()
        .and_then(Token::into_bytes)
        .ok_or_else(|| token_error(function))
}

fn lookup<'a>(
    contract: &'a ethers::contract::BaseContract,
    data: &[u8],
) -> Option<(&'a Function, Vec<Token>)> {
    let selector = data.get(..4)?;
    let function = contract
        .abi()
        .functions()
        .find(|function| function.short_signature() == selector)?;
    let tokens = function.decode_input(&data[4..]).ok()?;
    Some((function, tokens))
}

fn encode(token: Token) -> Bytes {
    abi::encode(&[token]).into()
}

impl MockChain {
    pub fn new(family: ChainFamily) -> Self {
        Self {
            family,
            sender: Address::repeat_byte(0x5e),
            inner: Arc::default(),
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockChainInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockChainInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_router(&self, address: Address, router: MockRouter) {
        let mut inner = self.write();
        inner.code.insert(address, PLACEHOLDER_CODE.to_vec().into());
        inner.routers.insert(address, router);
    }

    pub fn router(&self, address: Address) -> Option<MockRouter> {
        self.read().routers.get(&address).cloned()
    }

    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.write().code.insert(address, code.into());
    }

    pub fn code(&self, address: Address) -> Bytes {
        self.read().code.get(&address).cloned().unwrap_or_default()
    }

    /// Deployments whose creation code starts with `creation` install `runtime`.
    /// Unregistered deployments install the creation code itself.
    pub fn register_runtime(&self, creation: impl Into<Bytes>, runtime: impl Into<Bytes>) {
        self.write().runtimes.push((creation.into(), runtime.into()));
    }

    /// Calls to `to` with exactly `data` return `output`.
    pub fn set_view(&self, to: Address, data: impl Into<Bytes>, output: impl Into<Bytes>) {
        self.write().views.insert((to, data.into()), output.into());
    }

    /// The next `count` read calls fail at the transport level.
    pub fn fail_calls(&self, count: usize) {
        self.write().failing_calls = count;
    }

    /// The next `count` read calls are answered with a node error such as a
    /// rate limit.
    pub fn reject_reads(&self, count: usize, message: &str) {
        self.write().rejected_reads = (count > 0).then(|| (count, message.to_owned()));
    }

    /// The next `count` transactions fail at the transport level before reaching the chain.
    pub fn fail_sends(&self, count: usize) {
        self.write().failing_sends = count;
    }

    /// Transactions calling `function` are included but revert.
    pub fn revert_function(&self, function: &str, reason: &str) {
        self.write()
            .reverting
            .insert(function.to_owned(), reason.to_owned());
    }

    /// Transactions calling `function` succeed without changing any state.
    pub fn ignore_function(&self, function: &str) {
        self.write().ignored.insert(function.to_owned());
    }

    pub fn sent_transactions(&self) -> Vec<TxRequest> {
        self.read().sent.clone()
    }

    pub fn call_count(&self) -> usize {
        self.read().call_count
    }
}

impl MockChainInner {
    fn read_failure(&mut self) -> Option<ClientError> {
        if self.failing_calls > 0 {
            self.failing_calls -= 1;
            return Some(ClientError::Transport("connection refused".to_owned()));
        }
        let (count, message) = self.rejected_reads.as_mut()?;
        let err = ClientError::Rejected(message.clone());
        *count -= 1;
        if *count == 0 {
            self.rejected_reads = None;
        }
        Some(err)
    }

    fn installed_code(&self, creation: &[u8]) -> Bytes {
        self.runtimes
            .iter()
            .find(|(prefix, _)| creation.starts_with(prefix))
            .map(|(_, runtime)| runtime.clone())
            .unwrap_or_else(|| creation.to_vec().into())
    }

    fn install(&mut self, address: Address, creation: &[u8]) -> Result<(), String> {
        if self.code.get(&address).is_some_and(|code| !code.is_empty()) {
            return Err(format!("contract already exists at {address:?}"));
        }
        let code = self.installed_code(creation);
        self.code.insert(address, code);
        Ok(())
    }

    fn view(&self, router: &MockRouter, function: &Function, tokens: &[Token]) -> Result<Bytes, ClientError> {
        let name = function.name.as_str();
        let reverted = || ClientError::CallReverted("execution reverted".to_owned());
        if !router.supports(name) {
            return Err(reverted());
        }
        let output = match name {
            "owner" => Token::Address(router.owner),
            "feeManager" => Token::Address(router.fee_manager.ok_or_else(reverted)?),
            "wToken" => Token::Address(router.wrapped_token.ok_or_else(reverted)?),
            "bridgeAddress" | "mosAddress" => Token::Address(router.bridge),
            "feeReceiver" => Token::Address(router.fee.receiver),
            "routerFeeRate" | "feeRate" => Token::Uint(router.fee.rate_parts),
            "routerFixedFee" | "fixedFee" => Token::Uint(router.fee.fixed_amount),
            "maxFeeRate" => Token::Uint(router.referrer.ok_or_else(reverted)?.max_rate_parts),
            "maxNativeFee" => Token::Uint(router.referrer.ok_or_else(reverted)?.max_native_fee),
            "approved" => {
                let executor = address_arg(tokens, 0, name)?;
                Token::Bool(router.approved.contains(&executor))
            }
            _ => return Err(reverted()),
        };
        Ok(encode(output))
    }

    fn execute(
        &mut self,
        sender: Address,
        to: Address,
        function: &Function,
        tokens: &[Token],
    ) -> Result<(), String> {
        let name = function.name.as_str();
        let Some(router) = self.routers.get_mut(&to) else {
            return Err("not a router".to_owned());
        };
        let fee_setter = name == "setFee" && router.fee_manager == Some(sender);
        if sender != router.owner && !fee_setter {
            return Err(NOT_OWNER.to_owned());
        }
        let malformed = |err: ClientError| err.to_string();
        match name {
            "setAuthorization" => {
                let executors = tokens
                    .first()
                    .cloned()
                    .and_then(Token::into_array)
                    .ok_or_else(|| token_error(name).to_string())?;
                let flag = tokens
                    .get(1)
                    .cloned()
                    .and_then(Token::into_bool)
                    .ok_or_else(|| token_error(name).to_string())?;
                for executor in executors.into_iter().filter_map(Token::into_address) {
                    if flag {
                        router.approved.insert(executor);
                    } else {
                        router.approved.remove(&executor);
                    }
                }
            }
            "setFee" => {
                let rate_parts = uint_arg(tokens, 1, name).map_err(malformed)?;
                if rate_parts > U256::from(FEE_DENOMINATOR) {
                    return Err("Router: fee rate too high".to_owned());
                }
                router.fee = FeeParams {
                    receiver: address_arg(tokens, 0, name).map_err(malformed)?,
                    rate_parts,
                    fixed_amount: uint_arg(tokens, 2, name).map_err(malformed)?,
                };
            }
            "setBridgeAddress" | "setMosAddress" => {
                router.bridge = address_arg(tokens, 0, name).map_err(malformed)?;
            }
            "setReferrerMaxFee" => {
                router.referrer = Some(ReferrerMaxFee {
                    max_rate_parts: uint_arg(tokens, 0, name).map_err(malformed)?,
                    max_native_fee: uint_arg(tokens, 1, name).map_err(malformed)?,
                });
            }
            "setFeeManager" => {
                router.fee_manager = Some(address_arg(tokens, 0, name).map_err(malformed)?);
            }
            _ => return Err(format!("{name} is not a setter")),
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn family(&self) -> ChainFamily {
        self.family
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let mut inner = self.write();
        if let Some(err) = inner.read_failure() {
            return Err(err);
        }
        inner.call_count += 1;
        if let Some(output) = inner.views.get(&(to, data.clone())) {
            return Ok(output.clone());
        }

        let Some(router) = inner.routers.get(&to) else {
            // Calls to accounts without code succeed with empty output.
            return Ok(Bytes::default());
        };
        let (function, tokens) = lookup(&ROUTER, &data)
            .ok_or_else(|| ClientError::CallReverted("execution reverted".to_owned()))?;
        inner.view(router, function, &tokens)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ClientError> {
        let mut inner = self.write();
        if let Some(err) = inner.read_failure() {
            return Err(err);
        }
        Ok(inner.code.get(&address).cloned().unwrap_or_default())
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<TxReceipt, ClientError> {
        let mut inner = self.write();
        if inner.failing_sends > 0 {
            inner.failing_sends -= 1;
            return Err(ClientError::Transport("connection reset".to_owned()));
        }
        inner.sent.push(tx.clone());
        let tx_hash = H256::from_low_u64_be(inner.sent.len() as u64);
        let block_number = Some(inner.sent.len() as u64);
        let reverted = |reason: String| ClientError::Reverted {
            tx_hash,
            reason: Some(reason),
        };

        if tx.to == CONTRACT_DEPLOYER_ADDRESS && self.family == ChainFamily::ZkFactory {
            let (function, tokens) = lookup(&CONTRACT_DEPLOYER, &tx.data)
                .ok_or_else(|| reverted("unknown ContractDeployer call".to_owned()))?;
            let name = function.name.as_str();
            let salt = bytes32_arg(&tokens, 0, name)?;
            let bytecode_hash = bytes32_arg(&tokens, 1, name)?;
            let input = bytes_arg(&tokens, 2, name)?;
            let bytecode = tx
                .factory_deps
                .iter()
                .find(|dep| zksync_bytecode_hash(dep).ok() == Some(bytecode_hash))
                .ok_or_else(|| reverted("The code hash is not known".to_owned()))?;
            let address = zksync_create2_address(self.sender, salt, bytecode_hash, &input);
            inner.install(address, bytecode).map_err(reverted)?;
            return Ok(TxReceipt {
                tx_hash,
                block_number,
            });
        }

        if inner.routers.contains_key(&tx.to) {
            let (function, tokens) = lookup(&ROUTER, &tx.data)
                .ok_or_else(|| ClientError::CallReverted("execution reverted".to_owned()))?;
            let name = function.name.as_str();
            if let Some(router) = inner.routers.get(&tx.to) {
                if !router.supports(name) {
                    return Err(ClientError::CallReverted("execution reverted".to_owned()));
                }
            }
            if let Some(reason) = inner.reverting.get(name) {
                return Err(reverted(reason.clone()));
            }
            if !inner.ignored.contains(name) {
                inner
                    .execute(self.sender, tx.to, function, &tokens)
                    .map_err(reverted)?;
            }
            return Ok(TxReceipt {
                tx_hash,
                block_number,
            });
        }

        let is_contract = inner.code.get(&tx.to).is_some_and(|code| !code.is_empty());
        if let (true, Some((function, tokens))) = (is_contract, lookup(&DEPLOY_FACTORY, &tx.data)) {
            let name = function.name.as_str();
            if let Some(reason) = inner.reverting.get(name) {
                return Err(reverted(reason.clone()));
            }
            let prefix = self
                .family
                .create2_prefix()
                .ok_or_else(|| reverted("factory deployments are not supported".to_owned()))?;
            let salt = bytes32_arg(&tokens, 0, name)?;
            let creation = bytes_arg(&tokens, 1, name)?;
            let address = create2_address(prefix, tx.to, salt, &creation);
            inner.install(address, &creation).map_err(reverted)?;
            return Ok(TxReceipt {
                tx_hash,
                block_number,
            });
        }

        Err(reverted(format!("no contract at {:?}", tx.to)))
    }

    async fn create_contract(
        &self,
        request: CreateRequest,
    ) -> Result<(TxReceipt, Address), ClientError> {
        let mut inner = self.write();
        if inner.failing_sends > 0 {
            inner.failing_sends -= 1;
            return Err(ClientError::Transport("connection reset".to_owned()));
        }
        inner.sent.push(TxRequest {
            data: request.creation_code.clone(),
            ..TxRequest::default()
        });
        let nonce = inner.sent.len() as u64;
        let tx_hash = H256::from_low_u64_be(nonce);
        let mut preimage = self.sender.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let address = Address::from_slice(&keccak256(preimage)[12..]);
        inner
            .install(address, &request.creation_code)
            .map_err(|reason| ClientError::Reverted {
                tx_hash,
                reason: Some(reason),
            })?;
        let receipt = TxReceipt {
            tx_hash,
            block_number: Some(nonce),
        };
        Ok((receipt, address))
    }
}
