use routerctl_config::{ConfigError, DeploymentStoreError};
use routerctl_types::{Action, Address, AddressError, H256};

use crate::clients::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(#[from] AddressError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("RPC unavailable: {0}")]
    RpcUnavailable(String),
    #[error("No contract code at {0:?}")]
    ContractNotFound(Address),
    #[error("Transaction reverted: {reason}")]
    TxReverted {
        tx_hash: Option<H256>,
        reason: String,
    },
    #[error("{contract} is already deployed at {address:?}, use a different salt")]
    AddressAlreadyDeployed { contract: String, address: Address },
    #[error("Code at {address:?} has hash {actual:?}, expected {expected:?}")]
    DeployVerificationFailed {
        address: Address,
        expected: H256,
        actual: H256,
    },
    #[error("Router did not converge, {} action(s) still pending", residual.len())]
    ReconciliationIncomplete { residual: Vec<Action> },
    #[error("Deployment record conflict: {0}")]
    DeploymentRecordConflict(String),
    #[error("No artifact for contract {0}")]
    ArtifactNotFound(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("Deployment record store error: {0:#}")]
    Store(anyhow::Error),
}

impl ReconcileError {
    /// Only transport level failures are worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ReconcileError::RpcUnavailable(_))
    }

    /// Failure of a read. Nothing was sent, so apart from a broken signer
    /// every client error is worth another attempt.
    pub(crate) fn from_read(err: ClientError) -> Self {
        match err {
            err @ ClientError::Signing(_) => ReconcileError::InvalidConfig(err.to_string()),
            err => ReconcileError::RpcUnavailable(err.to_string()),
        }
    }
}

impl From<ClientError> for ReconcileError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Reverted { tx_hash, reason } => ReconcileError::TxReverted {
                tx_hash: Some(tx_hash),
                reason: reason.unwrap_or_else(|| "no revert reason".to_owned()),
            },
            ClientError::Rejected(reason) | ClientError::CallReverted(reason) => {
                ReconcileError::TxReverted {
                    tx_hash: None,
                    reason,
                }
            }
            err @ ClientError::Signing(_) => ReconcileError::InvalidConfig(err.to_string()),
            err @ (ClientError::Transport(_)
            | ClientError::Timeout(_)
            | ClientError::Malformed(_)) => ReconcileError::RpcUnavailable(err.to_string()),
        }
    }
}

impl From<ConfigError> for ReconcileError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidAddress { source, .. } => source.into(),
            err @ ConfigError::Invalid { .. } => ReconcileError::InvalidConfig(err.to_string()),
        }
    }
}

impl From<DeploymentStoreError> for ReconcileError {
    fn from(err: DeploymentStoreError) -> Self {
        match err {
            err @ DeploymentStoreError::Conflict { .. } => {
                ReconcileError::DeploymentRecordConflict(err.to_string())
            }
            DeploymentStoreError::Io(err) => ReconcileError::Store(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn reads_never_report_reverts() {
        let errors = [
            ClientError::Rejected("daily request count exceeded".to_owned()),
            ClientError::CallReverted("execution reverted".to_owned()),
            ClientError::Transport("connection refused".to_owned()),
        ];
        for err in errors {
            assert!(ReconcileError::from_read(err).is_retriable());
        }
    }

    #[test]
    fn send_rejections_are_reverts() {
        let err = ReconcileError::from(ClientError::CallReverted("execution reverted".to_owned()));
        assert_matches!(err, ReconcileError::TxReverted { tx_hash: None, .. });
        let err = ReconcileError::from(ClientError::Transport("connection reset".to_owned()));
        assert!(err.is_retriable());
    }
}
