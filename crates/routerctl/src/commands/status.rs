use routerctl_common::{logger, spinner::Spinner};
use routerctl_core::reconciler::{Reconciler, ReconcilerConfig};

use super::{args::StatusArgs, stop_on_ctrl_c};
use crate::{
    context::AppContext,
    messages::{MSG_READING_STATE_SPINNER, MSG_STATUS_DONE},
    report,
};

/// Dry run of a single network: reads and diffs every route, sends nothing.
pub async fn run(context: &AppContext, args: StatusArgs) -> anyhow::Result<()> {
    let network = context.network(&args.network)?;
    let adapter = context.adapter(&args.network)?;
    let config = ReconcilerConfig {
        dry_run: true,
        ..ReconcilerConfig::default()
    };
    let reconciler = Reconciler::new(adapter, config, stop_on_ctrl_c());

    let spinner = Spinner::new(MSG_READING_STATE_SPINNER);
    let report = reconciler.reconcile_network(&network).await;
    spinner.finish();

    for route in &report.routes {
        report::print_observed(&report.network, route, network.family);
    }
    report::print_network(&report, Some(network.family));

    if let Some(err) = report.routes.iter().find_map(|route| route.error.as_ref()) {
        anyhow::bail!("{}: {err}", report.network);
    }
    logger::outro(MSG_STATUS_DONE);
    Ok(())
}
