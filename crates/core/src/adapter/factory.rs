use std::sync::Arc;

use async_trait::async_trait;
use routerctl_config::{Artifacts, ContractArtifact};
use routerctl_types::{
    render_native, Action, Address, Bytes, ChainFamily, ConstructorArgs, Salt, TronEncoding, U256,
};

use super::{
    artifact, ensure_vacant, router, ChainAdapter, ObservedState, RouterRef, StateQuery,
};
use crate::{
    abi::DEPLOY_FACTORY,
    clients::{ChainClient, ClientError, CreateRequest, TxReceipt, TxRequest},
    create2::create2_address,
    ReconcileError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    /// CREATE2 through a deploy factory.
    Factory(Address),
    /// Contract-creation transactions. The chain assigns the address.
    Create,
    /// No way to deploy on this network.
    Unavailable,
}

/// Adapter for EVM and Tron chains.
///
/// With a factory exposing `deploy(bytes32 salt, bytes creationCode, uint256 value)`
/// both families deploy with CREATE2 and differ only in the prefix byte
/// (`0xff` vs `0x41`). Tron networks without a factory fall back to
/// contract-creation transactions, whose address is only known once the
/// transaction is built.
#[derive(Debug)]
pub struct FactoryAdapter {
    client: Arc<dyn ChainClient>,
    primitive: Primitive,
    prefix: u8,
    artifacts: Arc<Artifacts>,
}

impl FactoryAdapter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        factory: Option<Address>,
        artifacts: Arc<Artifacts>,
    ) -> Result<Self, ReconcileError> {
        let family = client.family();
        let prefix = family.create2_prefix().ok_or_else(|| {
            ReconcileError::InvalidConfig(format!("{family} chains do not deploy through a factory"))
        })?;
        let primitive = match (factory, family) {
            (Some(factory), _) => Primitive::Factory(factory),
            (None, ChainFamily::Tron) => Primitive::Create,
            (None, _) => Primitive::Unavailable,
        };
        Ok(Self {
            client,
            primitive,
            prefix,
            artifacts,
        })
    }

    fn factory(&self) -> Result<Address, ReconcileError> {
        match self.primitive {
            Primitive::Factory(factory) => Ok(factory),
            Primitive::Create => Err(ReconcileError::InvalidConfig(format!(
                "{} networks without deploy_factory get deployment addresses from the \
                 creation transaction",
                self.family()
            ))),
            Primitive::Unavailable => Err(ReconcileError::InvalidConfig(
                "no deploy_factory configured for this network".to_owned(),
            )),
        }
    }

    fn native(&self, address: Address) -> String {
        render_native(address, self.family(), TronEncoding::Base58)
    }

    /// Factories answering `getAddress(salt)` must agree with the derived
    /// address. Factories without the getter are trusted.
    async fn check_factory_address(
        &self,
        factory: Address,
        salt: &Salt,
        address: Address,
    ) -> Result<(), ReconcileError> {
        let data = DEPLOY_FACTORY
            .encode("getAddress", salt.hash())
            .map_err(|err| ReconcileError::InvalidConfig(format!("cannot encode getAddress: {err}")))?;
        let output = match self.client.call(factory, data).await {
            Ok(output) => output,
            Err(ClientError::CallReverted(_)) => Bytes::default(),
            Err(err) => return Err(ReconcileError::from_read(err)),
        };
        let Ok(reported) = DEPLOY_FACTORY.decode_output::<Address, _>("getAddress", output) else {
            tracing::debug!(factory = %self.native(factory), "factory does not report addresses");
            return Ok(());
        };
        if reported != address {
            return Err(ReconcileError::InvalidConfig(format!(
                "factory {} derives {} for salt {salt}, but {} was computed",
                self.native(factory),
                self.native(reported),
                self.native(address)
            )));
        }
        Ok(())
    }

    async fn create(
        &self,
        contract: &str,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError> {
        let artifact = self.artifact(contract)?;
        let abi = serde_json::to_string(&artifact.abi).map_err(|err| {
            ReconcileError::InvalidConfig(format!("cannot serialize the {contract} ABI: {err}"))
        })?;
        let request = CreateRequest {
            contract: contract.to_owned(),
            abi,
            creation_code: artifact.creation_code(args),
        };
        tracing::info!(contract, "deploying with a contract-creation transaction");
        let (receipt, address) = self.client.create_contract(request).await?;
        tracing::info!(
            contract,
            tx_hash = ?receipt.tx_hash,
            address = %self.native(address),
            "deployed"
        );
        Ok(address)
    }
}

#[async_trait]
impl ChainAdapter for FactoryAdapter {
    fn family(&self) -> ChainFamily {
        self.client.family()
    }

    fn sender(&self) -> Address {
        self.client.sender()
    }

    fn artifact(&self, contract: &str) -> Result<Arc<ContractArtifact>, ReconcileError> {
        artifact(&self.artifacts, contract)
    }

    async fn read_router_state(
        &self,
        router: &RouterRef,
        query: &StateQuery,
    ) -> Result<ObservedState, ReconcileError> {
        router::read_state(self.client.as_ref(), router, query).await
    }

    async fn send_action(
        &self,
        router: &RouterRef,
        action: &Action,
    ) -> Result<TxReceipt, ReconcileError> {
        router::send_action(self.client.as_ref(), router, action).await
    }

    fn salted_deploys(&self) -> bool {
        self.primitive != Primitive::Create
    }

    fn compute_deploy_address(
        &self,
        contract: &str,
        salt: &Salt,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError> {
        let creation_code = self.artifact(contract)?.creation_code(args);
        Ok(create2_address(
            self.prefix,
            self.factory()?,
            salt.hash(),
            &creation_code,
        ))
    }

    async fn deploy(
        &self,
        contract: &str,
        salt: &Salt,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError> {
        if self.primitive == Primitive::Create {
            return self.create(contract, args).await;
        }
        let factory = self.factory()?;
        let address = self.compute_deploy_address(contract, salt, args)?;
        self.check_factory_address(factory, salt, address).await?;
        ensure_vacant(self.client.as_ref(), contract, address).await?;

        let creation_code = self.artifact(contract)?.creation_code(args);
        let data = DEPLOY_FACTORY
            .encode("deploy", (salt.hash(), creation_code, U256::zero()))
            .map_err(|err| ReconcileError::InvalidConfig(format!("cannot encode deploy: {err}")))?;
        tracing::info!(
            contract,
            salt = %salt,
            factory = %self.native(factory),
            address = %self.native(address),
            "deploying"
        );
        let receipt = self.client.send_transaction(TxRequest::call(factory, data)).await?;
        tracing::info!(contract, tx_hash = ?receipt.tx_hash, "deployed");
        Ok(address)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ReconcileError> {
        self.client
            .get_code(address)
            .await
            .map_err(ReconcileError::from_read)
    }
}
