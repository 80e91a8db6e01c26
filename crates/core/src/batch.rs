//! Runs several networks at once. Networks are independent: a failure in one
//! never stops the others.

use std::sync::Arc;

use futures::{stream, StreamExt};
use routerctl_config::NetworkConfig;
use tokio::sync::watch;

use crate::{
    adapter::ChainAdapter,
    reconciler::{NetworkReport, Reconciler, ReconcilerConfig},
    ReconcileError,
};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// A network ready to reconcile, or the reason it could not be prepared.
#[derive(Debug)]
pub struct NetworkJob {
    pub network: String,
    pub prepared: Result<(NetworkConfig, Arc<dyn ChainAdapter>), ReconcileError>,
}

impl NetworkJob {
    pub fn new(network: NetworkConfig, adapter: Arc<dyn ChainAdapter>) -> Self {
        Self {
            network: network.name.clone(),
            prepared: Ok((network, adapter)),
        }
    }

    pub fn failed(network: impl Into<String>, error: ReconcileError) -> Self {
        Self {
            network: network.into(),
            prepared: Err(error),
        }
    }
}

/// Reconciles at most `concurrency` networks at a time. Reports are sorted by
/// network name.
pub async fn reconcile_networks(
    jobs: Vec<NetworkJob>,
    concurrency: usize,
    config: ReconcilerConfig,
    stop_receiver: watch::Receiver<bool>,
) -> Vec<NetworkReport> {
    tracing::info!(networks = jobs.len(), concurrency, "reconciling");
    let mut reports: Vec<_> = stream::iter(jobs)
        .map(|job| {
            let config = config.clone();
            let stop_receiver = stop_receiver.clone();
            async move {
                match job.prepared {
                    Ok((network, adapter)) => {
                        Reconciler::new(adapter, config, stop_receiver)
                            .reconcile_network(&network)
                            .await
                    }
                    Err(err) => {
                        tracing::warn!(network = %job.network, "network skipped: {err}");
                        NetworkReport::failed(job.network, err)
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    reports.sort_by(|a, b| a.network.cmp(&b.network));
    reports
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use routerctl_common::retry::RetryPolicy;
    use routerctl_config::{RouteConfig, RouteVersion};
    use routerctl_types::{Address, ChainFamily, FeeParams};

    use super::*;
    use crate::{
        adapter::FactoryAdapter,
        clients::{
            mock::{MockChain, MockRouter},
            ChainClient,
        },
        reconciler::Phase,
    };

    const ROUTER: Address = Address::repeat_byte(0xaa);

    fn job(name: &str, family: ChainFamily, with_router: bool) -> (MockChain, NetworkJob) {
        let chain = MockChain::new(family);
        if with_router {
            chain.add_router(ROUTER, MockRouter::new(RouteVersion::V3, chain.sender()));
        }
        let network = NetworkConfig {
            name: name.to_owned(),
            family,
            wrapped_token: None,
            routes: vec![RouteConfig {
                version: RouteVersion::V3,
                router: ROUTER,
                bridge: None,
                fee: FeeParams::default(),
                referrer: None,
                fee_manager: None,
                executors: vec![Address::repeat_byte(1)],
                deprecated_executors: vec![],
            }],
        };
        let adapter = FactoryAdapter::new(Arc::new(chain.clone()), None, Arc::default()).unwrap();
        (chain, NetworkJob::new(network, Arc::new(adapter)))
    }

    #[tokio::test]
    async fn failures_stay_within_their_network() {
        let (tron, tron_job) = job("Tron", ChainFamily::Tron, true);
        let (bsc, bsc_job) = job("Bsc", ChainFamily::Evm, true);
        let (_, eth_job) = job("Eth", ChainFamily::Evm, false);
        let jobs = vec![
            tron_job,
            eth_job,
            NetworkJob::failed("Base", ReconcileError::InvalidConfig("no such chain".to_owned())),
            bsc_job,
        ];
        let config = ReconcilerConfig {
            read_retry: RetryPolicy::immediate(1),
            send_retry: RetryPolicy::immediate(1),
            dry_run: false,
        };
        let (_stop_sender, stop_receiver) = watch::channel(false);

        let reports = reconcile_networks(jobs, 2, config, stop_receiver).await;
        let names: Vec<_> = reports.iter().map(|report| report.network.as_str()).collect();
        assert_eq!(names, ["Base", "Bsc", "Eth", "Tron"]);

        assert_matches!(reports[0].error, Some(ReconcileError::InvalidConfig(_)));
        assert!(reports[1].is_success());
        assert_eq!(reports[1].routes[0].phase, Phase::Converged);
        assert_matches!(
            reports[2].routes[0].error,
            Some(ReconcileError::ContractNotFound(_))
        );
        assert!(reports[3].is_success());

        assert_eq!(bsc.sent_transactions().len(), 1);
        assert_eq!(tron.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn zero_concurrency_still_runs() {
        let (chain, job) = job("Bsc", ChainFamily::Evm, true);
        let (_stop_sender, stop_receiver) = watch::channel(false);
        let reports =
            reconcile_networks(vec![job], 0, ReconcilerConfig::default(), stop_receiver).await;
        assert!(reports[0].is_success());
        assert_eq!(chain.sent_transactions().len(), 1);
    }
}
