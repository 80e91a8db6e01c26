//! Salted deployments with persisted records.
//!
//! The same `(contract, args, salt)` always lands at the same address on a
//! chain. Redeployments are caught before anything is sent, and a record never
//! changes address without an explicit redeploy.

use std::sync::Arc;

use ethers::utils::keccak256;
use routerctl_config::{DeploymentRecord, DeploymentStore, WritePolicy};
use routerctl_types::{render_native, Action, Address, Bytes, ConstructorArgs, Salt, TronEncoding, H256};
use serde::Serialize;

use crate::{adapter::ChainAdapter, ReconcileError};

/// Everything the external source verification step needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentOutput {
    pub network: String,
    pub contract: String,
    pub address: Address,
    /// Address in the network's native form.
    pub native_address: String,
    pub salt: String,
    pub salt_hash: H256,
    pub constructor_args: Bytes,
}

#[derive(Debug)]
pub struct DeterministicDeployer {
    network: String,
    adapter: Arc<dyn ChainAdapter>,
    store: Arc<dyn DeploymentStore>,
}

fn deploy_parts(action: &Action) -> Result<(&str, &Salt, &ConstructorArgs), ReconcileError> {
    match action {
        Action::Deploy {
            contract,
            salt,
            args,
        } => Ok((contract, salt, args)),
        other => Err(ReconcileError::InvalidConfig(format!(
            "{other} is not a deployment"
        ))),
    }
}

impl DeterministicDeployer {
    pub fn new(
        network: impl Into<String>,
        adapter: Arc<dyn ChainAdapter>,
        store: Arc<dyn DeploymentStore>,
    ) -> Self {
        Self {
            network: network.into(),
            adapter,
            store,
        }
    }

    /// Where `action` would deploy to. No network access. `None` if the chain
    /// assigns the address on creation.
    pub fn compute_address(&self, action: &Action) -> Result<Option<Address>, ReconcileError> {
        let (contract, salt, args) = deploy_parts(action)?;
        if !self.adapter.salted_deploys() {
            self.adapter.artifact(contract)?;
            return Ok(None);
        }
        self.adapter
            .compute_deploy_address(contract, salt, args)
            .map(Some)
    }

    /// Executes a [`Action::Deploy`]. With `redeploy`, an existing record for
    /// the contract may be replaced by the new address.
    pub async fn deploy(
        &self,
        action: &Action,
        redeploy: bool,
    ) -> Result<DeploymentOutput, ReconcileError> {
        let (contract, salt, args) = deploy_parts(action)?;
        let _guard = self
            .store
            .record_locks()
            .lock(&self.network, contract)
            .await;

        let computed = self.compute_address(action)?;
        let recorded = self
            .store
            .get(&self.network, contract)
            .map_err(ReconcileError::Store)?;
        if let Some(recorded) = recorded.filter(|recorded| Some(*recorded) != computed) {
            if !redeploy {
                let target = match computed {
                    Some(address) => format!("salt {salt} derives {address:?}"),
                    None => "a contract-creation transaction gets a new address".to_owned(),
                };
                return Err(ReconcileError::DeploymentRecordConflict(format!(
                    "{contract} on {} is recorded at {recorded:?}, {target}; \
                     pass the redeploy flag to replace the record",
                    self.network
                )));
            }
            tracing::info!(
                network = %self.network,
                contract,
                "redeploying, record {recorded:?} will be replaced"
            );
        }

        let address = self.adapter.deploy(contract, salt, args).await?;
        if let Some(computed) = computed.filter(|computed| *computed != address) {
            return Err(ReconcileError::InvalidConfig(format!(
                "{contract} was deployed at {address:?} but {computed:?} was computed"
            )));
        }

        // Code at `address` came from this deploy and is recorded even when
        // it does not match the artifact.
        let code = self.adapter.code_at(address).await?;
        let verified = self.verify(contract, address, &code);
        if !code.is_empty() {
            let record = DeploymentRecord {
                network: self.network.clone(),
                contract: contract.to_owned(),
                address,
            };
            let policy = if redeploy {
                WritePolicy::Replace
            } else {
                WritePolicy::WriteOnce
            };
            self.store.put(&record, policy)?;
        }
        verified?;

        Ok(DeploymentOutput {
            network: self.network.clone(),
            contract: contract.to_owned(),
            address,
            native_address: render_native(address, self.adapter.family(), TronEncoding::Base58),
            salt: salt.label().to_owned(),
            salt_hash: salt.hash(),
            constructor_args: args.encode(),
        })
    }

    /// Code must exist at `address` and match the artifact's runtime code if it
    /// has one. `expected` is zero in the error when there is nothing to compare to.
    fn verify(&self, contract: &str, address: Address, code: &[u8]) -> Result<(), ReconcileError> {
        let artifact = self.adapter.artifact(contract)?;
        let verified = match artifact.matches_runtime_code(code) {
            Some(matches) => matches,
            None => !code.is_empty(),
        };
        if verified {
            return Ok(());
        }
        let actual = H256(keccak256(code));
        tracing::warn!(
            network = %self.network,
            contract,
            ?address,
            ?actual,
            "unexpected code after deployment"
        );
        Err(ReconcileError::DeployVerificationFailed {
            address,
            expected: artifact.runtime_code_hash().unwrap_or_default(),
            actual,
        })
    }
}
