//! Operator-facing rendering of reconciliation reports.

use routerctl_common::logger;
use routerctl_core::{
    adapter::ObservedState,
    reconciler::{NetworkReport, Phase, RouteReport},
};
use routerctl_types::{render_native, Action, Address, ChainFamily, TronEncoding};
use serde::Serialize;

/// Router state with addresses in the network's native form.
#[derive(Debug, Serialize)]
struct ObservedView {
    owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wrapped_token: Option<String>,
    bridge: String,
    fee_receiver: String,
    fee_rate_parts: String,
    fee_fixed_amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    referrer_max_rate_parts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    referrer_max_native_fee: Option<String>,
    authorized_executors: Vec<String>,
}

impl ObservedView {
    fn new(state: &ObservedState, family: ChainFamily) -> Self {
        let native = |address: Address| native(address, family);
        Self {
            owner: native(state.owner),
            fee_manager: state.fee_manager.map(native),
            wrapped_token: state.wrapped_token.map(native),
            bridge: native(state.bridge),
            fee_receiver: native(state.fee.receiver),
            fee_rate_parts: state.fee.rate_parts.to_string(),
            fee_fixed_amount: state.fee.fixed_amount.to_string(),
            referrer_max_rate_parts: state
                .referrer
                .map(|referrer| referrer.max_rate_parts.to_string()),
            referrer_max_native_fee: state
                .referrer
                .map(|referrer| referrer.max_native_fee.to_string()),
            authorized_executors: state
                .authorized_executors
                .iter()
                .map(|executor| native(*executor))
                .collect(),
        }
    }
}

fn native(address: Address, family: ChainFamily) -> String {
    render_native(address, family, TronEncoding::Base58)
}

/// One line per action, with native addresses.
pub fn describe_action(action: &Action, family: ChainFamily) -> String {
    match action {
        Action::Authorize {
            executor,
            authorized: true,
        } => format!("authorize executor {}", native(*executor, family)),
        Action::Authorize {
            executor,
            authorized: false,
        } => format!("revoke executor {}", native(*executor, family)),
        Action::SetFee {
            receiver,
            rate_parts,
            fixed_amount,
        } => format!(
            "set fee: receiver {}, rate {rate_parts}, fixed {fixed_amount}",
            native(*receiver, family)
        ),
        Action::SetBridge(bridge) => format!("set bridge {}", native(*bridge, family)),
        Action::SetReferrerMaxFee {
            max_rate_parts,
            max_native_fee,
        } => format!("set referrer max fee: rate {max_rate_parts}, native {max_native_fee}"),
        Action::SetFeeManager(manager) => {
            format!("set fee manager {}", native(*manager, family))
        }
        Action::Deploy { contract, salt, .. } => format!("deploy {contract} with salt {salt}"),
    }
}

fn list(actions: impl IntoIterator<Item = String>) -> String {
    actions
        .into_iter()
        .map(|line| format!("  - {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn route_title(network: &str, route: &RouteReport, family: ChainFamily) -> String {
    format!(
        "{network} {} router {}",
        route.version,
        native(route.router, family)
    )
}

pub fn print_observed(network: &str, route: &RouteReport, family: ChainFamily) {
    if let Some(state) = &route.observed {
        logger::note(
            route_title(network, route, family),
            logger::object_to_string(ObservedView::new(state, family)),
        );
    }
}

pub fn print_route(network: &str, route: &RouteReport, family: ChainFamily) {
    let title = route_title(network, route, family);
    let describe = |action: &Action| describe_action(action, family);
    match route.phase {
        Phase::Converged if route.applied.is_empty() => {
            logger::success(format!("{title}: up to date"));
        }
        Phase::Converged => {
            logger::success(format!("{title}: converged"));
            logger::info(list(route.applied.iter().map(|applied| {
                format!("{} ({:?})", describe(&applied.action), applied.tx_hash)
            })));
        }
        Phase::Planned => {
            logger::note(
                format!("{title}: {} pending actions", route.planned.len()),
                list(route.planned.iter().map(describe)),
            );
        }
        _ => {
            let mut details = Vec::new();
            if !route.applied.is_empty() {
                details.push(format!(
                    "applied:\n{}",
                    list(route.applied.iter().map(|applied| describe(&applied.action)))
                ));
            }
            if let Some(action) = &route.failed_action {
                details.push(format!("failed:\n{}", list([describe(action)])));
            }
            if !route.not_attempted.is_empty() {
                details.push(format!(
                    "not attempted:\n{}",
                    list(route.not_attempted.iter().map(describe))
                ));
            }
            if !route.residual.is_empty() {
                details.push(format!(
                    "still different after apply:\n{}",
                    list(route.residual.iter().map(describe))
                ));
            }
            let reason = route
                .error
                .as_ref()
                .map_or_else(|| "unknown error".to_owned(), ToString::to_string);
            logger::error_note(&format!("{title}: {reason}"), &details.join("\n"));
        }
    }
    for drift in &route.drift {
        logger::warn(format!("{title}: {drift}"));
    }
}

pub fn print_network(report: &NetworkReport, family: Option<ChainFamily>) {
    if let Some(err) = &report.error {
        logger::error(format!("{}: {err}", report.network));
        return;
    }
    let family = family.unwrap_or_default();
    for route in &report.routes {
        print_route(&report.network, route, family);
    }
    if !report.skipped.is_empty() {
        let skipped: Vec<_> = report.skipped.iter().map(ToString::to_string).collect();
        logger::warn(format!(
            "{}: skipped routes {}",
            report.network,
            skipped.join(", ")
        ));
    }
}
