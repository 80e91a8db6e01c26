/// Name of the desired router configuration file.
pub const NETWORKS_FILE: &str = "networks.yaml";
/// Name of the chain registry file.
pub const CHAINS_FILE: &str = "chains.yaml";
/// Name of the deployment record file.
pub const DEPLOYMENTS_FILE: &str = "deployments.yaml";
/// Artifacts compiled for EVM and TVM chains.
pub const ARTIFACTS_DIR: &str = "artifacts";
/// Artifacts compiled with zksolc for zkSync-style chains.
pub const ZK_ARTIFACTS_DIR: &str = "artifacts-zk";

pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
pub const TRON_PRIVATE_KEY_ENV: &str = "TRON_PRIVATE_KEY";

/// Deploy factory shared by the EVM networks the routers live on.
pub const DEFAULT_DEPLOY_FACTORY: &str = "0x6258e4d2950757A749a4d4683A7342261ce12471";

pub const DEFAULT_CONFIRMATIONS: usize = 1;
pub const DEFAULT_TX_TIMEOUT_SECS: u64 = 180;
/// Energy limit for Tron contract calls, in sun.
pub const DEFAULT_TRON_FEE_LIMIT: u64 = 15_000_000_000;
