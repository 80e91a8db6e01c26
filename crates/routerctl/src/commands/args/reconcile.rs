use clap::Parser;
use routerctl_config::NetworksConfig;
use routerctl_core::batch::DEFAULT_CONCURRENCY;

use crate::messages::{MSG_ALL_HELP, MSG_JOBS_HELP, MSG_NETWORKS_HELP, MSG_NO_NETWORKS_ERR};

#[derive(Debug, Parser)]
pub struct ReconcileArgs {
    #[clap(help = MSG_NETWORKS_HELP)]
    pub networks: Vec<String>,
    #[clap(long, help = MSG_ALL_HELP, conflicts_with = "networks")]
    pub all: bool,
    #[clap(long, short, help = MSG_JOBS_HELP, default_value_t = DEFAULT_CONCURRENCY)]
    pub jobs: usize,
}

impl ReconcileArgs {
    /// Networks to run, deduplicated, in the order given.
    pub fn selected_networks(&self, declared: &NetworksConfig) -> anyhow::Result<Vec<String>> {
        if self.all {
            return Ok(declared.names().map(str::to_owned).collect());
        }
        anyhow::ensure!(!self.networks.is_empty(), MSG_NO_NETWORKS_ERR);
        let mut selected: Vec<String> = Vec::with_capacity(self.networks.len());
        for network in &self.networks {
            if !selected.contains(network) {
                selected.push(network.clone());
            }
        }
        Ok(selected)
    }
}
