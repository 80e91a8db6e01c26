//! Per-route state machine:
//! `Init -> ReadState -> Diffing -> Applying -> Verifying -> Converged | Failed`.
//!
//! Actions are applied strictly in order and partial progress is kept when an
//! action fails. Cancellation is only acknowledged between actions.

use std::sync::Arc;

use routerctl_common::retry::RetryPolicy;
use routerctl_config::{NetworkConfig, RouteConfig, RouteVersion};
use routerctl_types::{Action, Address, ChainFamily, H256};
use tokio::sync::watch;

use crate::{
    adapter::{ChainAdapter, ObservedState, RouterRef, StateQuery},
    diff::{diff, drift, Drift},
    ReconcileError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Init,
    ReadState,
    Diffing,
    Applying,
    Verifying,
    /// Terminal state of a dry run with a non-empty plan.
    Planned,
    Converged,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Planned | Phase::Converged | Phase::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub read_retry: RetryPolicy,
    pub send_retry: RetryPolicy,
    /// Stop after diffing and report the plan.
    pub dry_run: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            read_retry: RetryPolicy::default(),
            send_retry: RetryPolicy::default(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAction {
    pub action: Action,
    pub tx_hash: H256,
}

/// Outcome of one route, whatever state it ended in.
#[derive(Debug)]
pub struct RouteReport {
    pub version: RouteVersion,
    pub router: Address,
    pub phase: Phase,
    /// Last state read from the router.
    pub observed: Option<ObservedState>,
    pub planned: Vec<Action>,
    pub applied: Vec<AppliedAction>,
    /// Action that was attempted and failed; its error is in `error`.
    pub failed_action: Option<Action>,
    pub not_attempted: Vec<Action>,
    /// Actions still needed after applying the plan.
    pub residual: Vec<Action>,
    pub drift: Vec<Drift>,
    pub error: Option<ReconcileError>,
}

impl RouteReport {
    fn new(route: &RouteConfig) -> Self {
        Self {
            version: route.version,
            router: route.router,
            phase: Phase::Init,
            observed: None,
            planned: Vec::new(),
            applied: Vec::new(),
            failed_action: None,
            not_attempted: Vec::new(),
            residual: Vec::new(),
            drift: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, err: ReconcileError) -> Phase {
        self.error = Some(err);
        Phase::Failed
    }
}

#[derive(Debug)]
pub struct NetworkReport {
    pub network: String,
    pub routes: Vec<RouteReport>,
    /// Routes not started because an earlier route failed.
    pub skipped: Vec<RouteVersion>,
    /// Failure before any route could start, e.g. an unreachable config.
    pub error: Option<ReconcileError>,
}

impl NetworkReport {
    pub fn failed(network: impl Into<String>, error: ReconcileError) -> Self {
        Self {
            network: network.into(),
            routes: Vec::new(),
            skipped: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self.skipped.is_empty()
            && self.routes.iter().all(|route| route.phase != Phase::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    adapter: Arc<dyn ChainAdapter>,
    config: ReconcilerConfig,
    stop_receiver: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        config: ReconcilerConfig,
        stop_receiver: watch::Receiver<bool>,
    ) -> Self {
        Self {
            adapter,
            config,
            stop_receiver,
        }
    }

    pub fn family(&self) -> ChainFamily {
        self.adapter.family()
    }

    fn is_stopped(&self) -> bool {
        *self.stop_receiver.borrow()
    }

    /// Routes run in version order; the first failed route stops the network.
    pub async fn reconcile_network(&self, network: &NetworkConfig) -> NetworkReport {
        let mut report = NetworkReport {
            network: network.name.clone(),
            routes: Vec::with_capacity(network.routes.len()),
            skipped: Vec::new(),
            error: None,
        };
        let mut routes = network.routes.iter();
        while let Some(route) = routes.next() {
            let route_report = self.reconcile_route(network, route).await;
            let failed = route_report.phase == Phase::Failed;
            report.routes.push(route_report);
            if failed {
                report.skipped = routes.map(|route| route.version).collect();
                if !report.skipped.is_empty() {
                    tracing::warn!(
                        network = %network.name,
                        skipped = ?report.skipped,
                        "route failed, skipping the remaining routes"
                    );
                }
                break;
            }
        }
        report
    }

    #[tracing::instrument(skip_all, fields(network = %network.name, version = %route.version))]
    pub async fn reconcile_route(&self, network: &NetworkConfig, route: &RouteConfig) -> RouteReport {
        let router = RouterRef::of(route);
        let query = StateQuery::for_route(route);
        let mut report = RouteReport::new(route);
        let mut observed = ObservedState::default();

        let mut phase = Phase::Init;
        loop {
            report.phase = phase;
            tracing::debug!(%phase, "route phase");
            if phase.is_terminal() {
                break;
            }
            phase = match phase {
                Phase::Init if self.is_stopped() => report.fail(ReconcileError::Cancelled),
                Phase::Init => Phase::ReadState,
                Phase::ReadState => match self.read_state(&router, &query).await {
                    Ok(state) => {
                        observed = state;
                        report.observed = Some(observed.clone());
                        Phase::Diffing
                    }
                    Err(err) => report.fail(err),
                },
                Phase::Diffing => self.plan(network, route, &observed, &mut report),
                Phase::Applying => self.apply(&router, &mut report).await,
                Phase::Verifying => match self.read_state(&router, &query).await {
                    Ok(state) => {
                        let residual = diff(route, &state);
                        report.observed = Some(state);
                        if residual.is_empty() {
                            Phase::Converged
                        } else {
                            report.residual = residual.clone();
                            report.fail(ReconcileError::ReconciliationIncomplete { residual })
                        }
                    }
                    Err(err) => report.fail(err),
                },
                Phase::Planned | Phase::Converged | Phase::Failed => phase,
            };
        }

        match &report.error {
            Some(err) => tracing::warn!(phase = %report.phase, "route failed: {err}"),
            None => tracing::info!(
                phase = %report.phase,
                planned = report.planned.len(),
                applied = report.applied.len(),
                "route done"
            ),
        }
        report
    }

    async fn read_state(
        &self,
        router: &RouterRef,
        query: &StateQuery,
    ) -> Result<ObservedState, ReconcileError> {
        self.config
            .read_retry
            .retry("read router state", ReconcileError::is_retriable, || {
                self.adapter.read_router_state(router, query)
            })
            .await
    }

    fn plan(
        &self,
        network: &NetworkConfig,
        route: &RouteConfig,
        observed: &ObservedState,
        report: &mut RouteReport,
    ) -> Phase {
        if let Err(err) = route.validate(&network.name) {
            return report.fail(err.into());
        }
        report.planned = diff(route, observed);
        report.drift = drift(network, observed);
        for drift in &report.drift {
            tracing::warn!("drift: {drift}");
        }

        if report.planned.is_empty() {
            return Phase::Converged;
        }
        if observed.owner != self.adapter.sender() {
            tracing::warn!(
                owner = ?observed.owner,
                sender = ?self.adapter.sender(),
                "router is owned by another account, setters will likely revert"
            );
        }
        if self.config.dry_run {
            Phase::Planned
        } else {
            Phase::Applying
        }
    }

    async fn apply(&self, router: &RouterRef, report: &mut RouteReport) -> Phase {
        let mut pending = report.planned.clone().into_iter();
        while let Some(action) = pending.next() {
            if self.is_stopped() {
                report.not_attempted = std::iter::once(action).chain(pending).collect();
                return report.fail(ReconcileError::Cancelled);
            }

            let result = self
                .config
                .send_retry
                .retry(action.kind(), ReconcileError::is_retriable, || {
                    self.adapter.send_action(router, &action)
                })
                .await;
            match result {
                Ok(receipt) => report.applied.push(AppliedAction {
                    action,
                    tx_hash: receipt.tx_hash,
                }),
                Err(err) => {
                    tracing::warn!(action = %action, "action failed: {err}");
                    report.failed_action = Some(action);
                    report.not_attempted = pending.collect();
                    return report.fail(err);
                }
            }
        }
        Phase::Verifying
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use routerctl_config::{Artifacts, ContractArtifact};
    use routerctl_types::{Bytes, ConstructorArgs, FeeParams, Salt};

    use super::*;
    use crate::{
        adapter::FactoryAdapter,
        clients::{
            mock::{MockChain, MockRouter},
            ChainClient, TxReceipt,
        },
    };

    const ROUTER: Address = Address::repeat_byte(0xaa);
    const RECEIVER: Address = Address::repeat_byte(0xfe);
    const A: Address = Address::repeat_byte(0x0a);
    const B: Address = Address::repeat_byte(0x0b);
    const Z: Address = Address::repeat_byte(0x0f);

    fn route() -> RouteConfig {
        RouteConfig {
            version: RouteVersion::V3,
            router: ROUTER,
            bridge: None,
            fee: FeeParams {
                receiver: RECEIVER,
                rate_parts: 0.into(),
                fixed_amount: 0.into(),
            },
            referrer: None,
            fee_manager: None,
            executors: vec![A, B],
            deprecated_executors: vec![Z],
        }
    }

    fn network(routes: Vec<RouteConfig>) -> NetworkConfig {
        NetworkConfig {
            name: "Bsc".to_owned(),
            family: ChainFamily::Evm,
            wrapped_token: None,
            routes,
        }
    }

    /// Router with `{A, Z}` authorized and a 7000 / 1e8 fee: the plan for
    /// [`route()`] is `[Authorize(B), SetFee, Revoke(Z)]`.
    fn chain() -> MockChain {
        let chain = MockChain::new(ChainFamily::Evm);
        let mut router = MockRouter::new(RouteVersion::V3, chain.sender());
        router.fee = FeeParams {
            receiver: RECEIVER,
            rate_parts: 7000.into(),
            fixed_amount: 100_000_000.into(),
        };
        router.approved.extend([A, Z]);
        chain.add_router(ROUTER, router);
        chain
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            read_retry: RetryPolicy::immediate(3),
            send_retry: RetryPolicy::immediate(3),
            dry_run: false,
        }
    }

    fn reconciler(chain: &MockChain, config: ReconcilerConfig) -> (watch::Sender<bool>, Reconciler) {
        let adapter = FactoryAdapter::new(Arc::new(chain.clone()), None, Arc::default()).unwrap();
        let (stop_sender, stop_receiver) = watch::channel(false);
        (stop_sender, Reconciler::new(Arc::new(adapter), config, stop_receiver))
    }

    #[tokio::test]
    async fn converges_and_verifies() {
        let chain = chain();
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Converged, "{:?}", report.error);
        assert_eq!(
            report.planned,
            [
                Action::authorize(B),
                Action::SetFee {
                    receiver: RECEIVER,
                    rate_parts: 0.into(),
                    fixed_amount: 0.into(),
                },
                Action::revoke(Z),
            ]
        );
        assert_eq!(report.applied.len(), 3);
        assert!(report.residual.is_empty());

        let router = chain.router(ROUTER).unwrap();
        assert_eq!(router.approved, BTreeSet::from([A, B]));
        assert_eq!(router.fee.rate_parts, 0.into());

        // A second pass has nothing to do.
        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Converged);
        assert!(report.planned.is_empty());
        assert_eq!(chain.sent_transactions().len(), 3);
    }

    #[tokio::test]
    async fn revert_halts_and_keeps_progress() {
        let chain = chain();
        chain.revert_function("setFee", "Router: fee manager only");
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].action, Action::authorize(B));
        assert_matches!(report.failed_action, Some(Action::SetFee { .. }));
        assert_matches!(
            report.error,
            Some(ReconcileError::TxReverted { tx_hash: Some(_), ref reason }) if reason == "Router: fee manager only"
        );
        assert_eq!(report.not_attempted, [Action::revoke(Z)]);
        // No rollback of the applied authorization.
        assert!(chain.router(ROUTER).unwrap().approved.contains(&B));
    }

    #[tokio::test]
    async fn send_outage_retries_the_same_action() {
        let chain = chain();
        chain.fail_sends(2);
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Converged, "{:?}", report.error);
        let sent = chain.sent_transactions();
        assert_eq!(sent.len(), 3);
        assert_eq!(report.applied[0].action, Action::authorize(B));
    }

    #[tokio::test]
    async fn read_outage_exhausts_the_retry_budget() {
        let chain = chain();
        chain.fail_calls(3);
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Failed);
        assert_matches!(report.error, Some(ReconcileError::RpcUnavailable(_)));
        assert!(report.planned.is_empty());
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn read_outage_within_budget_recovers() {
        let chain = chain();
        chain.fail_calls(2);
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Converged, "{:?}", report.error);
    }

    #[tokio::test]
    async fn rate_limited_reads_are_retried() {
        let chain = chain();
        chain.reject_reads(2, "daily request count exceeded, request rate limited");
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Converged, "{:?}", report.error);
    }

    #[tokio::test]
    async fn ignored_update_leaves_a_residual() {
        let chain = chain();
        chain.ignore_function("setFee");
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.applied.len(), 3);
        assert_matches!(report.residual.as_slice(), [Action::SetFee { .. }]);
        assert_matches!(
            report.error,
            Some(ReconcileError::ReconciliationIncomplete { ref residual }) if residual.len() == 1
        );
    }

    #[tokio::test]
    async fn dry_run_only_plans() {
        let chain = chain();
        let (_stop, reconciler) = reconciler(
            &chain,
            ReconcilerConfig {
                dry_run: true,
                ..config()
            },
        );
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Planned);
        assert_eq!(report.planned.len(), 3);
        assert!(report.error.is_none());
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn missing_router_stops_the_network() {
        let chain = chain();
        let (_stop, reconciler) = reconciler(&chain, config());
        let mut v2 = route();
        v2.version = RouteVersion::V2;
        v2.router = Address::repeat_byte(0x22);
        let network = network(vec![v2, route()]);

        let report = reconciler.reconcile_network(&network).await;
        assert!(!report.is_success());
        assert_eq!(report.routes.len(), 1);
        assert_matches!(
            report.routes[0].error,
            Some(ReconcileError::ContractNotFound(address)) if address == Address::repeat_byte(0x22)
        );
        assert_eq!(report.skipped, [RouteVersion::V3]);
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn invalid_route_is_not_applied() {
        let chain = chain();
        let (_stop, reconciler) = reconciler(&chain, config());
        let mut route = route();
        route.fee.rate_parts = 1_000_001.into();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Failed);
        assert_matches!(report.error, Some(ReconcileError::InvalidConfig(_)));
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn wrapped_token_drift_is_reported() {
        let chain = chain();
        let (_stop, reconciler) = reconciler(&chain, config());
        let route = route();
        let mut network = network(vec![route.clone()]);
        network.wrapped_token = Some(Address::repeat_byte(0x77));

        let report = reconciler.reconcile_route(&network, &route).await;
        assert_eq!(report.phase, Phase::Converged);
        assert_eq!(
            report.drift,
            [Drift::WrappedToken {
                expected: Address::repeat_byte(0x77),
                actual: None,
            }]
        );
    }

    /// Raises the stop signal once the first action has been included.
    #[derive(Debug)]
    struct StopAfterFirstSend {
        inner: FactoryAdapter,
        stop_sender: watch::Sender<bool>,
    }

    #[async_trait]
    impl ChainAdapter for StopAfterFirstSend {
        fn family(&self) -> ChainFamily {
            self.inner.family()
        }

        fn sender(&self) -> Address {
            self.inner.sender()
        }

        fn artifact(&self, contract: &str) -> Result<Arc<ContractArtifact>, ReconcileError> {
            self.inner.artifact(contract)
        }

        async fn read_router_state(
            &self,
            router: &RouterRef,
            query: &StateQuery,
        ) -> Result<ObservedState, ReconcileError> {
            self.inner.read_router_state(router, query).await
        }

        async fn send_action(
            &self,
            router: &RouterRef,
            action: &Action,
        ) -> Result<TxReceipt, ReconcileError> {
            let receipt = self.inner.send_action(router, action).await?;
            self.stop_sender.send_replace(true);
            Ok(receipt)
        }

        fn compute_deploy_address(
            &self,
            contract: &str,
            salt: &Salt,
            args: &ConstructorArgs,
        ) -> Result<Address, ReconcileError> {
            self.inner.compute_deploy_address(contract, salt, args)
        }

        async fn deploy(
            &self,
            contract: &str,
            salt: &Salt,
            args: &ConstructorArgs,
        ) -> Result<Address, ReconcileError> {
            self.inner.deploy(contract, salt, args).await
        }

        async fn code_at(&self, address: Address) -> Result<Bytes, ReconcileError> {
            self.inner.code_at(address).await
        }
    }

    #[tokio::test]
    async fn cancellation_stops_between_actions() {
        let chain = chain();
        let (stop_sender, stop_receiver) = watch::channel(false);
        let adapter = StopAfterFirstSend {
            inner: FactoryAdapter::new(Arc::new(chain.clone()), None, Arc::new(Artifacts::default()))
                .unwrap(),
            stop_sender,
        };
        let reconciler = Reconciler::new(Arc::new(adapter), config(), stop_receiver);
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Failed);
        assert_matches!(report.error, Some(ReconcileError::Cancelled));
        assert_eq!(report.applied.len(), 1);
        assert!(report.failed_action.is_none());
        assert_eq!(report.not_attempted.len(), 2);
        assert_eq!(chain.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn stopped_run_sends_nothing() {
        let chain = chain();
        let (stop_sender, reconciler) = reconciler(&chain, config());
        stop_sender.send_replace(true);
        let route = route();

        let report = reconciler.reconcile_route(&network(vec![route.clone()]), &route).await;
        assert_eq!(report.phase, Phase::Failed);
        assert_matches!(report.error, Some(ReconcileError::Cancelled));
        assert_eq!(chain.call_count(), 0);
    }
}
