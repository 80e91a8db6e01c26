//! Family-agnostic access to routers and salted deployments.
//!
//! Family branching lives in [`connect`] and in the deploy primitives of the
//! two adapter implementations: [`FactoryAdapter`] (EVM and Tron, CREATE2
//! through a deploy factory or Tron contract-creation transactions) and
//! [`ZkFactoryAdapter`] (zkSync ContractDeployer).

use std::{collections::BTreeSet, fmt, sync::Arc};

use async_trait::async_trait;
use routerctl_config::{Artifacts, ChainEntry, ContractArtifact, RouteConfig, RouteVersion};
use routerctl_types::{
    to_canonical, Action, Address, Bytes, ChainFamily, ConstructorArgs, FeeParams, ReferrerMaxFee,
    Salt,
};
use secrecy::SecretString;

pub use self::{factory::FactoryAdapter, zk::ZkFactoryAdapter};
use crate::{
    clients::{ChainClient, EvmRpcClient, TronHttpClient, TxReceipt, ZkSyncClient},
    ReconcileError,
};

mod factory;
mod router;
mod zk;

/// A router contract and the ABI generation it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterRef {
    pub address: Address,
    pub version: RouteVersion,
}

impl RouterRef {
    pub fn of(route: &RouteConfig) -> Self {
        Self {
            address: route.router,
            version: route.version,
        }
    }
}

/// Executors to check. The router keeps a mapping that cannot be enumerated,
/// so only the listed addresses show up in [`ObservedState::authorized_executors`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateQuery {
    pub executors: Vec<Address>,
}

impl StateQuery {
    /// Desired and deprecated executors of `route`, each once.
    pub fn for_route(route: &RouteConfig) -> Self {
        let mut seen = BTreeSet::new();
        let executors = route
            .executors
            .iter()
            .chain(&route.deprecated_executors)
            .copied()
            .filter(|executor| seen.insert(*executor))
            .collect();
        Self { executors }
    }
}

/// Live state of one router, read on demand and never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    pub authorized_executors: BTreeSet<Address>,
    pub fee: FeeParams,
    pub bridge: Address,
    /// `None` if the router does not expose referrer limits.
    pub referrer: Option<ReferrerMaxFee>,
    pub owner: Address,
    pub fee_manager: Option<Address>,
    pub wrapped_token: Option<Address>,
}

#[async_trait]
pub trait ChainAdapter: 'static + Send + Sync + fmt::Debug {
    fn family(&self) -> ChainFamily;

    /// Account the adapter signs with.
    fn sender(&self) -> Address;

    fn artifact(&self, contract: &str) -> Result<Arc<ContractArtifact>, ReconcileError>;

    /// Fails with [`ReconcileError::ContractNotFound`] if there is no code at the router.
    async fn read_router_state(
        &self,
        router: &RouterRef,
        query: &StateQuery,
    ) -> Result<ObservedState, ReconcileError>;

    /// Submits `action` and waits for inclusion.
    async fn send_action(
        &self,
        router: &RouterRef,
        action: &Action,
    ) -> Result<TxReceipt, ReconcileError>;

    /// Whether deployment addresses follow from the salt. If not, the chain
    /// assigns them on creation and [`Self::compute_deploy_address`] fails.
    fn salted_deploys(&self) -> bool {
        true
    }

    /// Address a salted deployment would land at. No network access.
    fn compute_deploy_address(
        &self,
        contract: &str,
        salt: &Salt,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError>;

    /// Deploys at the computed address. Refuses with
    /// [`ReconcileError::AddressAlreadyDeployed`] before sending anything if
    /// the address already has code. Without salted deploys the contract
    /// lands wherever the chain puts it.
    async fn deploy(
        &self,
        contract: &str,
        salt: &Salt,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, ReconcileError>;
}

/// Secrets needed to drive one network.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub signing_key: SecretString,
    /// TronGrid API key.
    pub api_key: Option<SecretString>,
}

fn artifact(artifacts: &Artifacts, contract: &str) -> Result<Arc<ContractArtifact>, ReconcileError> {
    artifacts
        .get(contract)
        .ok_or_else(|| ReconcileError::ArtifactNotFound(contract.to_owned()))
}

async fn ensure_vacant(
    client: &dyn ChainClient,
    contract: &str,
    address: Address,
) -> Result<(), ReconcileError> {
    let code = client
        .get_code(address)
        .await
        .map_err(ReconcileError::from_read)?;
    if !code.is_empty() {
        return Err(ReconcileError::AddressAlreadyDeployed {
            contract: contract.to_owned(),
            address,
        });
    }
    Ok(())
}

/// Builds the client and adapter matching the network's chain family.
pub fn connect(
    entry: &ChainEntry,
    credentials: &Credentials,
    artifacts: Arc<Artifacts>,
) -> Result<Arc<dyn ChainAdapter>, ReconcileError> {
    let client_error = |err: anyhow::Error| {
        ReconcileError::InvalidConfig(format!("cannot set up the {} client: {err:#}", entry.family))
    };
    let factory = entry
        .deploy_factory()
        .map(|factory| to_canonical(factory, entry.family))
        .transpose()?;

    let adapter: Arc<dyn ChainAdapter> = match entry.family {
        ChainFamily::Evm => {
            let client = EvmRpcClient::new(
                &entry.rpc_url,
                entry.chain_id,
                &credentials.signing_key,
                entry.confirmations,
                entry.tx_timeout(),
            )
            .map_err(client_error)?;
            Arc::new(FactoryAdapter::new(Arc::new(client), factory, artifacts)?)
        }
        ChainFamily::Tron => {
            let client = TronHttpClient::new(
                entry.rpc_url.clone(),
                entry.chain_id,
                &credentials.signing_key,
                credentials.api_key.as_ref(),
                entry.tron_fee_limit(),
                entry.confirmations,
                entry.tx_timeout(),
            )
            .map_err(client_error)?;
            Arc::new(FactoryAdapter::new(Arc::new(client), factory, artifacts)?)
        }
        ChainFamily::ZkFactory => {
            if factory.is_some() {
                tracing::warn!(
                    "deploy_factory is ignored on zkSync-style chains, deployments go through the ContractDeployer"
                );
            }
            let client = ZkSyncClient::new(
                &entry.rpc_url,
                entry.chain_id,
                &credentials.signing_key,
                entry.confirmations,
                entry.tx_timeout(),
            )
            .map_err(client_error)?;
            Arc::new(ZkFactoryAdapter::new(Arc::new(client), artifacts))
        }
    };
    Ok(adapter)
}
