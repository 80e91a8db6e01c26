use std::{collections::BTreeMap, time::Duration};

use anyhow::Context;
use routerctl_types::ChainFamily;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    consts::{
        CHAINS_FILE, DEFAULT_CONFIRMATIONS, DEFAULT_DEPLOY_FACTORY, DEFAULT_TRON_FEE_LIMIT,
        DEFAULT_TX_TIMEOUT_SECS,
    },
    traits::{FileConfigTrait, FileConfigWithDefaultName},
};

/// How to reach one network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainEntry {
    pub family: ChainFamily,
    pub chain_id: u64,
    pub rpc_url: Url,
    /// CREATE2 factory exposing `deploy(bytes32,bytes,uint256)`, in the
    /// family's native address form. EVM chains fall back to the shared
    /// factory, Tron chains without one deploy with contract-creation
    /// transactions. Not used on zkSync-style chains, which deploy through the
    /// system ContractDeployer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_factory: Option<String>,
    /// Environment variable holding the TronGrid API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_limit: Option<u64>,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,
}

fn default_confirmations() -> usize {
    DEFAULT_CONFIRMATIONS
}

fn default_tx_timeout_secs() -> u64 {
    DEFAULT_TX_TIMEOUT_SECS
}

impl ChainEntry {
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }

    /// Configured deploy factory, or the shared one on EVM chains.
    pub fn deploy_factory(&self) -> Option<&str> {
        match (&self.deploy_factory, self.family) {
            (Some(factory), _) => Some(factory.as_str()),
            (None, ChainFamily::Evm) => Some(DEFAULT_DEPLOY_FACTORY),
            (None, ChainFamily::Tron | ChainFamily::ZkFactory) => None,
        }
    }

    pub fn tron_fee_limit(&self) -> u64 {
        self.fee_limit.unwrap_or(DEFAULT_TRON_FEE_LIMIT)
    }
}

/// Chain registry: network name to connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainsConfig {
    pub networks: BTreeMap<String, ChainEntry>,
}

impl FileConfigTrait for ChainsConfig {}

impl FileConfigWithDefaultName for ChainsConfig {
    const FILE_NAME: &'static str = CHAINS_FILE;
}

impl ChainsConfig {
    pub fn get(&self, network: &str) -> anyhow::Result<&ChainEntry> {
        self.networks.get(network).with_context(|| {
            format!(
                "network `{network}` is not in the chain registry, known networks: {:?}",
                self.networks.keys().collect::<Vec<_>>()
            )
        })
    }
}
