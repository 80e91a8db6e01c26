//! Persisted `(network, contract) -> address` records.
//!
//! A record is write-once: once a contract is recorded for a network its
//! address only changes through an explicit [`WritePolicy::Replace`].

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use routerctl_types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use xshell::Shell;

use crate::{
    consts::DEPLOYMENTS_FILE,
    traits::{FileConfigTrait, FileConfigWithDefaultName, ReadConfig, SaveConfig},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: String,
    pub contract: String,
    pub address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Refuse to change an existing record.
    #[default]
    WriteOnce,
    /// Overwrite an existing record. Only used for explicit redeploys.
    Replace,
}

#[derive(Debug, thiserror::Error)]
pub enum DeploymentStoreError {
    #[error(
        "{contract} on {network} is already recorded at {existing:?}, refusing to record {new:?}"
    )]
    Conflict {
        network: String,
        contract: String,
        existing: Address,
        new: Address,
    },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// File layout: network name, then contract name, then address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deployments(pub BTreeMap<String, BTreeMap<String, Address>>);

impl FileConfigTrait for Deployments {}

impl FileConfigWithDefaultName for Deployments {
    const FILE_NAME: &'static str = DEPLOYMENTS_FILE;
}

impl Deployments {
    pub fn get(&self, network: &str, contract: &str) -> Option<Address> {
        self.0.get(network)?.get(contract).copied()
    }

    fn insert(
        &mut self,
        record: &DeploymentRecord,
        policy: WritePolicy,
    ) -> Result<bool, DeploymentStoreError> {
        match (self.get(&record.network, &record.contract), policy) {
            (Some(existing), _) if existing == record.address => Ok(false),
            (Some(existing), WritePolicy::WriteOnce) => Err(DeploymentStoreError::Conflict {
                network: record.network.clone(),
                contract: record.contract.clone(),
                existing,
                new: record.address,
            }),
            (existing, _) => {
                if let Some(existing) = existing {
                    tracing::warn!(
                        network = %record.network,
                        contract = %record.contract,
                        "replacing deployment record {existing:?} with {:?}",
                        record.address
                    );
                }
                self.0
                    .entry(record.network.clone())
                    .or_default()
                    .insert(record.contract.clone(), record.address);
                Ok(true)
            }
        }
    }
}

/// Async locks keyed by `(network, contract)`, held across a whole
/// compute-deploy-record sequence. Locks nobody holds or waits for are
/// dropped on the next acquisition.
#[derive(Debug, Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl RecordLocks {
    pub async fn lock(&self, network: &str, contract: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((network.to_owned(), contract.to_owned()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

pub trait DeploymentStore: Send + Sync + fmt::Debug {
    fn get(&self, network: &str, contract: &str) -> anyhow::Result<Option<Address>>;

    /// Stores a record. Writing the address already on record is a no-op.
    fn put(
        &self,
        record: &DeploymentRecord,
        policy: WritePolicy,
    ) -> Result<(), DeploymentStoreError>;

    fn record_locks(&self) -> &RecordLocks;
}

/// Store backed by a YAML (or TOML/JSON) file. Every write re-reads the
/// file so that records added by other processes are not lost or
/// overwritten.
#[derive(Debug)]
pub struct FileDeploymentStore {
    path: PathBuf,
    file_guard: Mutex<()>,
    locks: RecordLocks,
}

impl FileDeploymentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_guard: Mutex::new(()),
            locks: RecordLocks::default(),
        }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(Deployments::get_path_with_base_path(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, shell: &Shell) -> anyhow::Result<Deployments> {
        if !shell.path_exists(&self.path) {
            return Ok(Deployments::default());
        }
        Deployments::read(shell, &self.path)
    }
}

impl DeploymentStore for FileDeploymentStore {
    fn get(&self, network: &str, contract: &str) -> anyhow::Result<Option<Address>> {
        let shell = Shell::new()?;
        Ok(self.load(&shell)?.get(network, contract))
    }

    fn put(
        &self,
        record: &DeploymentRecord,
        policy: WritePolicy,
    ) -> Result<(), DeploymentStoreError> {
        let _guard = self
            .file_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let shell = Shell::new().context("failed to open shell")?;
        let mut deployments = self.load(&shell)?;
        if deployments.insert(record, policy)? {
            deployments
                .save(&shell, &self.path)
                .with_context(|| format!("failed to write {:?}", self.path))?;
            tracing::info!(
                network = %record.network,
                contract = %record.contract,
                "recorded deployment at {:?}",
                record.address
            );
        }
        Ok(())
    }

    fn record_locks(&self) -> &RecordLocks {
        &self.locks
    }
}

#[derive(Debug, Default)]
pub struct MemoryDeploymentStore {
    records: Mutex<Deployments>,
    locks: RecordLocks,
}

impl MemoryDeploymentStore {
    pub fn with_records(records: impl IntoIterator<Item = DeploymentRecord>) -> Self {
        let mut deployments = Deployments::default();
        for record in records {
            deployments
                .0
                .entry(record.network)
                .or_default()
                .insert(record.contract, record.address);
        }
        Self {
            records: Mutex::new(deployments),
            locks: RecordLocks::default(),
        }
    }

    pub fn snapshot(&self) -> Deployments {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DeploymentStore for MemoryDeploymentStore {
    fn get(&self, network: &str, contract: &str) -> anyhow::Result<Option<Address>> {
        Ok(self.snapshot().get(network, contract))
    }

    fn put(
        &self,
        record: &DeploymentRecord,
        policy: WritePolicy,
    ) -> Result<(), DeploymentStoreError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record, policy)
            .map(drop)
    }

    fn record_locks(&self) -> &RecordLocks {
        &self.locks
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    fn record(network: &str, contract: &str, byte: u8) -> DeploymentRecord {
        DeploymentRecord {
            network: network.to_owned(),
            contract: contract.to_owned(),
            address: Address::repeat_byte(byte),
        }
    }

    #[test]
    fn file_store_persists_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDeploymentStore::in_dir(dir.path());
        assert_eq!(store.get("Bsc", "ButterRouterV4").unwrap(), None);

        store
            .put(&record("Bsc", "ButterRouterV4", 1), WritePolicy::WriteOnce)
            .unwrap();
        store
            .put(&record("Tron", "ButterRouterV4", 2), WritePolicy::WriteOnce)
            .unwrap();

        // A fresh store over the same file sees both records.
        let reopened = FileDeploymentStore::in_dir(dir.path());
        assert_eq!(
            reopened.get("Bsc", "ButterRouterV4").unwrap(),
            Some(Address::repeat_byte(1))
        );
        assert_eq!(
            reopened.get("Tron", "ButterRouterV4").unwrap(),
            Some(Address::repeat_byte(2))
        );
    }

    #[test]
    fn records_are_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDeploymentStore::in_dir(dir.path());
        store
            .put(&record("Bsc", "SwapAdapterV3", 1), WritePolicy::WriteOnce)
            .unwrap();
        // Same address again is fine.
        store
            .put(&record("Bsc", "SwapAdapterV3", 1), WritePolicy::WriteOnce)
            .unwrap();

        let err = store
            .put(&record("Bsc", "SwapAdapterV3", 9), WritePolicy::WriteOnce)
            .unwrap_err();
        assert_matches!(
            err,
            DeploymentStoreError::Conflict { existing, new, .. }
                if existing == Address::repeat_byte(1) && new == Address::repeat_byte(9)
        );
        assert_eq!(
            store.get("Bsc", "SwapAdapterV3").unwrap(),
            Some(Address::repeat_byte(1))
        );

        store
            .put(&record("Bsc", "SwapAdapterV3", 9), WritePolicy::Replace)
            .unwrap();
        assert_eq!(
            store.get("Bsc", "SwapAdapterV3").unwrap(),
            Some(Address::repeat_byte(9))
        );
    }

    #[test]
    fn memory_store_checks_conflicts() {
        let store = MemoryDeploymentStore::with_records([record("Eth", "ButterRouterV2", 3)]);
        assert_matches!(
            store.put(&record("Eth", "ButterRouterV2", 4), WritePolicy::WriteOnce),
            Err(DeploymentStoreError::Conflict { .. })
        );
        store
            .put(&record("Eth", "ButterRouterV4", 4), WritePolicy::WriteOnce)
            .unwrap();
        assert_eq!(store.snapshot().0["Eth"].len(), 2);
    }

    #[tokio::test]
    async fn record_locks_are_exclusive_per_key() {
        let locks = RecordLocks::default();
        let guard = locks.lock("Bsc", "ButterRouterV4").await;

        let same_key = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock("Bsc", "ButterRouterV4"),
        )
        .await;
        assert!(same_key.is_err());

        // Other keys are independent.
        let _other = locks.lock("Bsc", "SwapAdapterV3").await;

        drop(guard);
        let _again = locks.lock("Bsc", "ButterRouterV4").await;
    }

    #[tokio::test]
    async fn released_record_locks_are_dropped() {
        let locks = RecordLocks::default();
        for contract in ["ButterRouterV4", "SwapAdapterV3", "FeeManager"] {
            let _guard = locks.lock("Bsc", contract).await;
        }
        let held = locks.lock("Tron", "ButterRouterV4").await;
        assert_eq!(locks.tracked(), 1);

        let _other = locks.lock("Tron", "SwapAdapterV3").await;
        assert_eq!(locks.tracked(), 2);
        drop(held);
    }
}
