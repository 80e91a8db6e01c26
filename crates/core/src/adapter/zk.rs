use std::sync::Arc;

use async_trait::async_trait;
use routerctl_config::{Artifacts, ContractArtifact};
use routerctl_types::{Action, Address, Bytes, ChainFamily, ConstructorArgs, Salt, H256};

use super::{
    artifact, ensure_vacant, router, ChainAdapter, ObservedState, RouterRef, StateQuery,
};
use crate::{
    abi::CONTRACT_DEPLOYER,
    clients::{ChainClient, TxReceipt, TxRequest},
    create2::{zksync_bytecode_hash, zksync_create2_address, CONTRACT_DEPLOYER_ADDRESS},
    ReconcileError,
};

/// Adapter for zkSync-style chains. Deployments call `create2` on the
/// ContractDeployer system contract and ship the bytecode as a factory
/// dependency, so artifacts must be zksolc output.
#[derive(Debug)]
pub struct ZkFactoryAdapter {
    client: Arc<dyn ChainClient>,
    artifacts: Arc<Artifacts>,
}

impl ZkFactoryAdapter {
    pub fn new(client: Arc<dyn ChainClient>, artifacts: Arc<Artifacts>) -> Self {
        Self { client, artifacts }
    }

    fn bytecode_hash(artifact: &ContractArtifact) -> Result<H256, ReconcileError> {
        zksync_bytecode_hash(&artifact.bytecode).map_err(|err| {
            ReconcileError::InvalidConfig(format!(
                "{} is not EraVM bytecode ({err}); was it compiled with zksolc?",
                artifact.contract_name
            ))
        })
    }
}

#[async_trait]
impl ChainAdapter for ZkFactoryAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::ZkFactory
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

    fn compute_deploy_address(
        &self,
        contract: &str,
        salt: &Salt,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError> {
        let artifact = self.artifact(contract)?;
        Ok(zksync_create2_address(
            self.sender(),
            salt.hash(),
            Self::bytecode_hash(&artifact)?,
            &args.encode(),
        ))
    }

    async fn deploy(
        &self,
        contract: &str,
        salt: &Salt,
        args: &ConstructorArgs,
    ) -> Result<Address, ReconcileError> {
        let artifact = self.artifact(contract)?;
        let bytecode_hash = Self::bytecode_hash(&artifact)?;
        let address = self.compute_deploy_address(contract, salt, args)?;
        ensure_vacant(self.client.as_ref(), contract, address).await?;

        let data = CONTRACT_DEPLOYER
            .encode("create2", (salt.hash(), bytecode_hash, args.encode()))
            .map_err(|err| ReconcileError::InvalidConfig(format!("cannot encode create2: {err}")))?;
        let tx = TxRequest {
            to: CONTRACT_DEPLOYER_ADDRESS,
            data,
            factory_deps: vec![artifact.bytecode.clone()],
            ..TxRequest::default()
        };
        tracing::info!(contract, salt = %salt, address = ?address, "deploying");
        let receipt = self.client.send_transaction(tx).await?;
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

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ethers::abi::{Abi, Token};

    use super::*;
    use crate::clients::mock::MockChain;

    fn artifacts(bytecode: Vec<u8>) -> Arc<Artifacts> {
        let mut artifacts = Artifacts::default();
        artifacts.insert(ContractArtifact {
            contract_name: "ButterRouterV4".to_owned(),
            abi: Abi::default(),
            deployed_bytecode: bytecode.clone().into(),
            bytecode: bytecode.into(),
        });
        Arc::new(artifacts)
    }

    #[tokio::test]
    async fn deploys_through_the_contract_deployer() {
        let chain = MockChain::new(ChainFamily::ZkFactory);
        let adapter = ZkFactoryAdapter::new(Arc::new(chain.clone()), artifacts(vec![7; 32 * 5]));
        let salt = Salt::new("ButterRouterV4_v1");
        let args = ConstructorArgs::new(vec![Token::Address(Address::repeat_byte(1))]);

        let expected = adapter
            .compute_deploy_address("ButterRouterV4", &salt, &args)
            .unwrap();
        let address = adapter.deploy("ButterRouterV4", &salt, &args).await.unwrap();
        assert_eq!(address, expected);
        assert_eq!(chain.code(address), Bytes::from(vec![7; 32 * 5]));

        let sent = chain.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, CONTRACT_DEPLOYER_ADDRESS);
        assert_eq!(sent[0].factory_deps, [Bytes::from(vec![7; 32 * 5])]);

        let err = adapter
            .deploy("ButterRouterV4", &salt, &args)
            .await
            .unwrap_err();
        assert_matches!(err, ReconcileError::AddressAlreadyDeployed { .. });
        assert_eq!(chain.sent_transactions().len(), 1);
    }

    #[test]
    fn address_depends_on_the_sender() {
        let artifacts = artifacts(vec![7; 32]);
        let first = ZkFactoryAdapter::new(
            Arc::new(MockChain::new(ChainFamily::ZkFactory)),
            artifacts.clone(),
        );
        let second = ZkFactoryAdapter::new(
            Arc::new(MockChain::new(ChainFamily::ZkFactory).with_sender(Address::repeat_byte(2))),
            artifacts,
        );
        let salt = Salt::new("v1");
        let args = ConstructorArgs::default();
        assert_ne!(
            first.compute_deploy_address("ButterRouterV4", &salt, &args).unwrap(),
            second.compute_deploy_address("ButterRouterV4", &salt, &args).unwrap()
        );
    }

    #[test]
    fn evm_bytecode_is_rejected() {
        let adapter = ZkFactoryAdapter::new(
            Arc::new(MockChain::new(ChainFamily::ZkFactory)),
            artifacts(vec![0x60, 0x80, 0x60, 0x40]),
        );
        assert_matches!(
            adapter.compute_deploy_address("ButterRouterV4", &Salt::new("v1"), &ConstructorArgs::default()),
            Err(ReconcileError::InvalidConfig(_))
        );
    }
}
