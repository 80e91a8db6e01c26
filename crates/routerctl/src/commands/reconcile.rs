use std::sync::Arc;

use routerctl_common::{logger, spinner::Spinner};
use routerctl_config::NetworkConfig;
use routerctl_core::{
    adapter::ChainAdapter,
    batch::{reconcile_networks, NetworkJob},
    reconciler::ReconcilerConfig,
    ReconcileError,
};

use super::{args::ReconcileArgs, stop_on_ctrl_c};
use crate::{
    context::AppContext,
    messages::{msg_networks_failed_err, MSG_RECONCILED, MSG_RECONCILING_SPINNER},
    report,
};

pub async fn run(context: &AppContext, args: ReconcileArgs) -> anyhow::Result<()> {
    let networks = args.selected_networks(&context.networks)?;
    let jobs = networks
        .iter()
        .map(|network| match prepare(context, network) {
            Ok((config, adapter)) => NetworkJob::new(config, adapter),
            Err(err) => NetworkJob::failed(network.as_str(), err),
        })
        .collect();

    let stop_receiver = stop_on_ctrl_c();
    let spinner = Spinner::new(MSG_RECONCILING_SPINNER);
    let reports = reconcile_networks(jobs, args.jobs, ReconcilerConfig::default(), stop_receiver).await;
    spinner.finish();

    for report in &reports {
        let family = context
            .chains
            .networks
            .get(&report.network)
            .map(|entry| entry.family);
        report::print_network(report, family);
    }

    let failed = reports.iter().filter(|report| !report.is_success()).count();
    anyhow::ensure!(failed == 0, msg_networks_failed_err(failed, reports.len()));
    logger::outro(MSG_RECONCILED);
    Ok(())
}

fn prepare(
    context: &AppContext,
    network: &str,
) -> Result<(NetworkConfig, Arc<dyn ChainAdapter>), ReconcileError> {
    Ok((context.network(network)?, context.adapter(network)?))
}
