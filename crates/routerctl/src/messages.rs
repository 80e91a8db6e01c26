use std::path::Path;

/// Common messages
pub(super) const MSG_FAILED: &str = "Failed";
pub(super) const MSG_STOP_REQUESTED: &str =
    "Stop requested, finishing the transactions in flight";
pub(super) const MSG_ARTIFACTS_NOT_FOUND: &str = "No artifacts directory, deployments are disabled";

pub(super) fn msg_config_load_err(path: &Path) -> String {
    format!("Failed to load configuration from {path:?}")
}

pub(super) fn msg_network_not_declared_err(network: &str) -> String {
    format!("Network `{network}` is not declared in networks.yaml")
}

pub(super) fn msg_missing_env_err(variable: &str) -> String {
    format!("Environment variable {variable} is not set")
}

/// Reconcile related messages
pub(super) const MSG_NETWORKS_HELP: &str = "Networks to reconcile";
pub(super) const MSG_ALL_HELP: &str = "Reconcile every network declared in networks.yaml";
pub(super) const MSG_JOBS_HELP: &str = "How many networks to reconcile at once";
pub(super) const MSG_NO_NETWORKS_ERR: &str = "Name at least one network or pass --all";
pub(super) const MSG_RECONCILING_SPINNER: &str = "Reconciling routers...";
pub(super) const MSG_RECONCILED: &str = "All routers match the configuration";

pub(super) fn msg_networks_failed_err(failed: usize, total: usize) -> String {
    format!("{failed} of {total} networks did not converge")
}

/// Deploy related messages
pub(super) const MSG_SALT_HELP: &str = "Salt label, hashed into the deployment address";
pub(super) const MSG_ARG_HELP: &str =
    "Constructor argument in declaration order; addresses in the network's native form";
pub(super) const MSG_REDEPLOY_HELP: &str =
    "Replace an existing deployment record that points to another address";
pub(super) const MSG_OUTPUT_HELP: &str = "Save the deployment output as JSON";
pub(super) const MSG_DEPLOY_DRY_RUN_HELP: &str = "Only print the address the contract would get";
pub(super) const MSG_DEPLOYING_SPINNER: &str = "Deploying...";
pub(super) const MSG_DEPLOYMENT_OUTPUT: &str = "Deployment";
pub(super) const MSG_DEPLOYED: &str = "Contract deployed and recorded";

pub(super) fn msg_deploy_address(contract: &str, address: &str) -> String {
    format!("{contract} deploys to {address}")
}

pub(super) fn msg_address_on_creation(contract: &str) -> String {
    format!("{contract} gets its address from the creation transaction")
}

pub(super) fn msg_deployment_saved(path: &Path) -> String {
    format!("Deployment output saved to {path:?}")
}

/// Status related messages
pub(super) const MSG_READING_STATE_SPINNER: &str = "Reading router state...";
pub(super) const MSG_STATUS_DONE: &str = "Nothing was sent";
