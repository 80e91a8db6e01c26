use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use routerctl_config::{
    consts::{ARTIFACTS_DIR, PRIVATE_KEY_ENV, TRON_PRIVATE_KEY_ENV, ZK_ARTIFACTS_DIR},
    traits::ReadConfigWithBasePath,
    Artifacts, ChainEntry, ChainsConfig, FileDeploymentStore, NetworkConfig, NetworksConfig,
};
use routerctl_core::{
    adapter::{connect, ChainAdapter, Credentials},
    ReconcileError,
};
use routerctl_types::ChainFamily;
use secrecy::SecretString;
use xshell::Shell;

use crate::messages::{
    msg_config_load_err, msg_missing_env_err, msg_network_not_declared_err,
    MSG_ARTIFACTS_NOT_FOUND,
};

/// Configuration loaded once per invocation. Nothing in it changes while
/// commands run.
pub struct AppContext {
    pub shell: Shell,
    pub config_dir: PathBuf,
    pub chains: ChainsConfig,
    pub networks: NetworksConfig,
    pub store: Arc<FileDeploymentStore>,
}

impl AppContext {
    pub fn load(config_dir: PathBuf) -> anyhow::Result<Self> {
        let shell = Shell::new()?;
        let chains = ChainsConfig::read_with_base_path(&shell, &config_dir)
            .with_context(|| msg_config_load_err(&config_dir))?;
        let networks = NetworksConfig::read_with_base_path(&shell, &config_dir)
            .with_context(|| msg_config_load_err(&config_dir))?;
        let store = Arc::new(FileDeploymentStore::in_dir(&config_dir));
        Ok(Self {
            shell,
            config_dir,
            chains,
            networks,
            store,
        })
    }

    pub fn chain(&self, network: &str) -> Result<&ChainEntry, ReconcileError> {
        self.chains
            .get(network)
            .map_err(|err| ReconcileError::InvalidConfig(format!("{err:#}")))
    }

    /// Desired state of `network` with deployment references resolved.
    pub fn network(&self, network: &str) -> Result<NetworkConfig, ReconcileError> {
        let raw = self
            .networks
            .get(network)
            .ok_or_else(|| ReconcileError::InvalidConfig(msg_network_not_declared_err(network)))?;
        let family = self.chain(network)?.family;
        Ok(NetworkConfig::from_raw(
            network,
            raw,
            family,
            self.store.as_ref(),
        )?)
    }

    pub fn adapter(&self, network: &str) -> Result<Arc<dyn ChainAdapter>, ReconcileError> {
        let entry = self.chain(network)?;
        let credentials =
            credentials(entry).map_err(|err| ReconcileError::InvalidConfig(format!("{err:#}")))?;
        let artifacts = self
            .artifacts(entry.family)
            .map_err(|err| ReconcileError::InvalidConfig(format!("{err:#}")))?;
        connect(entry, &credentials, artifacts)
    }

    /// zkSync-style chains need zksolc output, everything else shares the
    /// regular artifacts. A missing directory yields no artifacts.
    fn artifacts(&self, family: ChainFamily) -> anyhow::Result<Arc<Artifacts>> {
        let dir = match family {
            ChainFamily::ZkFactory => ZK_ARTIFACTS_DIR,
            ChainFamily::Evm | ChainFamily::Tron => ARTIFACTS_DIR,
        };
        let dir = self.config_dir.join(dir);
        if !self.shell.path_exists(&dir) {
            tracing::debug!(?dir, "{MSG_ARTIFACTS_NOT_FOUND}");
            return Ok(Arc::default());
        }
        let artifacts = Artifacts::load_dir(&self.shell, &dir)?;
        tracing::debug!(?dir, count = artifacts.len(), "loaded artifacts");
        Ok(Arc::new(artifacts))
    }
}

fn credentials(entry: &ChainEntry) -> anyhow::Result<Credentials> {
    let key_env = match entry.family {
        ChainFamily::Tron => TRON_PRIVATE_KEY_ENV,
        ChainFamily::Evm | ChainFamily::ZkFactory => PRIVATE_KEY_ENV,
    };
    let signing_key = read_secret(key_env)?;
    let api_key = entry.api_key_env.as_deref().map(read_secret).transpose()?;
    Ok(Credentials {
        signing_key,
        api_key,
    })
}

fn read_secret(variable: &str) -> anyhow::Result<SecretString> {
    let value = std::env::var(variable).with_context(|| msg_missing_env_err(variable))?;
    Ok(SecretString::new(value))
}
