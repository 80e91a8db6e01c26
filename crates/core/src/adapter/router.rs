//! Router ABI plumbing shared by all adapters.

use std::collections::BTreeSet;

use ethers::abi::{Detokenize, Tokenize};
use routerctl_config::RouteVersion;
use routerctl_types::{Action, Address, Bytes, FeeParams, ReferrerMaxFee, U256};

use super::{ObservedState, RouterRef, StateQuery};
use crate::{
    abi::ROUTER,
    clients::{ChainClient, ClientError, TxReceipt, TxRequest},
    ReconcileError,
};

/// Getter names differ between router generations.
struct Getters {
    bridge: &'static str,
    rate: &'static str,
    fixed: &'static str,
}

fn getters(version: RouteVersion) -> Getters {
    match version {
        RouteVersion::V2 => Getters {
            bridge: "mosAddress",
            rate: "feeRate",
            fixed: "fixedFee",
        },
        RouteVersion::V3 => Getters {
            bridge: "bridgeAddress",
            rate: "routerFeeRate",
            fixed: "routerFixedFee",
        },
    }
}

fn encode_call<T: Tokenize>(function: &str, args: T) -> Result<Bytes, ReconcileError> {
    ROUTER
        .encode(function, args)
        .map_err(|err| ReconcileError::InvalidConfig(format!("cannot encode {function}: {err}")))
}

struct Reader<'a> {
    client: &'a dyn ChainClient,
    router: Address,
}

impl Reader<'_> {
    async fn raw<T: Tokenize>(&self, function: &str, args: T) -> Result<Bytes, ClientError> {
        let data = ROUTER
            .encode(function, args)
            .map_err(|err| ClientError::Malformed(format!("cannot encode {function}: {err}")))?;
        self.client.call(self.router, data).await
    }

    fn decode<D: Detokenize>(&self, function: &str, output: Bytes) -> Result<D, ReconcileError> {
        ROUTER.decode_output(function, output).map_err(|err| {
            ReconcileError::RpcUnavailable(format!(
                "undecodable {function}() output from {:?}: {err}",
                self.router
            ))
        })
    }

    /// Getter every router of the version has.
    async fn get<D: Detokenize, T: Tokenize>(
        &self,
        function: &str,
        args: T,
    ) -> Result<D, ReconcileError> {
        match self.raw(function, args).await {
            Ok(output) => self.decode(function, output),
            Err(ClientError::CallReverted(reason)) => Err(ReconcileError::InvalidConfig(format!(
                "router {:?} reverted {function}() ({reason}); is the route version right?",
                self.router
            ))),
            Err(err) => Err(ReconcileError::from_read(err)),
        }
    }

    /// Getter that older deployments may lack. A revert reads as `None`.
    async fn optional<D: Detokenize>(&self, function: &str) -> Result<Option<D>, ReconcileError> {
        match self.raw(function, ()).await {
            Ok(output) => self.decode(function, output).map(Some),
            Err(ClientError::CallReverted(_)) => Ok(None),
            Err(err) => Err(ReconcileError::from_read(err)),
        }
    }
}

pub(super) async fn read_state(
    client: &dyn ChainClient,
    router: &RouterRef,
    query: &StateQuery,
) -> Result<ObservedState, ReconcileError> {
    let code = client
        .get_code(router.address)
        .await
        .map_err(ReconcileError::from_read)?;
    if code.is_empty() {
        return Err(ReconcileError::ContractNotFound(router.address));
    }

    let reader = Reader {
        client,
        router: router.address,
    };
    let getters = getters(router.version);
    let owner: Address = reader.get("owner", ()).await?;
    let fee = FeeParams {
        receiver: reader.get("feeReceiver", ()).await?,
        rate_parts: reader.get(getters.rate, ()).await?,
        fixed_amount: reader.get(getters.fixed, ()).await?,
    };
    let bridge: Address = reader.get(getters.bridge, ()).await?;
    let referrer = if router.version.supports_referrer_fee() {
        let max_rate_parts: Option<U256> = reader.optional("maxFeeRate").await?;
        let max_native_fee: Option<U256> = reader.optional("maxNativeFee").await?;
        max_rate_parts.zip(max_native_fee).map(|(max_rate_parts, max_native_fee)| {
            ReferrerMaxFee {
                max_rate_parts,
                max_native_fee,
            }
        })
    } else {
        None
    };
    let fee_manager: Option<Address> = reader.optional("feeManager").await?;
    let wrapped_token: Option<Address> = reader.optional("wToken").await?;

    let mut authorized_executors = BTreeSet::new();
    for &executor in &query.executors {
        let approved: bool = reader.get("approved", executor).await?;
        if approved {
            authorized_executors.insert(executor);
        }
    }

    Ok(ObservedState {
        authorized_executors,
        fee,
        bridge,
        referrer,
        owner,
        fee_manager,
        wrapped_token,
    })
}

/// Calldata of the router setter implementing `action`.
pub(super) fn encode_action(version: RouteVersion, action: &Action) -> Result<Bytes, ReconcileError> {
    match action {
        Action::Authorize {
            executor,
            authorized,
        } => encode_call("setAuthorization", (vec![*executor], *authorized)),
        Action::SetFee {
            receiver,
            rate_parts,
            fixed_amount,
        } => encode_call("setFee", (*receiver, *rate_parts, *fixed_amount)),
        Action::SetBridge(bridge) => match version {
            RouteVersion::V2 => encode_call("setMosAddress", *bridge),
            RouteVersion::V3 => encode_call("setBridgeAddress", *bridge),
        },
        Action::SetReferrerMaxFee {
            max_rate_parts,
            max_native_fee,
        } => {
            if !version.supports_referrer_fee() {
                return Err(ReconcileError::InvalidConfig(format!(
                    "{version} routers have no referrer fee limits"
                )));
            }
            encode_call("setReferrerMaxFee", (*max_rate_parts, *max_native_fee))
        }
        Action::SetFeeManager(manager) => encode_call("setFeeManager", *manager),
        Action::Deploy { contract, .. } => Err(ReconcileError::InvalidConfig(format!(
            "deployment of {contract} is not a router call"
        ))),
    }
}

pub(super) async fn send_action(
    client: &dyn ChainClient,
    router: &RouterRef,
    action: &Action,
) -> Result<TxReceipt, ReconcileError> {
    let data = encode_action(router.version, action)?;
    let receipt = client
        .send_transaction(TxRequest::call(router.address, data))
        .await?;
    tracing::info!(
        router = ?router.address,
        action = %action,
        tx_hash = ?receipt.tx_hash,
        "router updated"
    );
    Ok(receipt)
}
