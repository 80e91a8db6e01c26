//! Desired vs. observed router state.
//!
//! [`diff`] is pure and deterministic. Authorizations always come first and
//! revocations last.

use std::{collections::HashSet, fmt};

use routerctl_config::{NetworkConfig, RouteConfig};
use routerctl_types::{Action, Address, FeeParams};

use crate::adapter::ObservedState;

/// Difference no router setter can fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The wrapped native token is a constructor argument; fixing it needs a
    /// redeployment.
    WrappedToken {
        expected: Address,
        actual: Option<Address>,
    },
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::WrappedToken { expected, actual } => match actual {
                Some(actual) => write!(
                    f,
                    "wrapped token is {actual:?}, expected {expected:?}; redeploy the router to change it"
                ),
                None => write!(f, "router does not report its wrapped token, expected {expected:?}"),
            },
        }
    }
}

/// Ordered actions that move `observed` to `desired`:
///
/// 1. `Authorize(e, true)` for missing executors, in declared order;
/// 2. `SetFee`, `SetBridge`, `SetReferrerMaxFee`, `SetFeeManager` for the
///    declared fields that differ, in that order;
/// 3. `Authorize(z, false)` for deprecated executors still authorized.
pub fn diff(desired: &RouteConfig, observed: &ObservedState) -> Vec<Action> {
    let mut actions = Vec::new();

    let mut seen = HashSet::new();
    for &executor in &desired.executors {
        if seen.insert(executor) && !observed.authorized_executors.contains(&executor) {
            actions.push(Action::authorize(executor));
        }
    }

    if desired.fee != observed.fee {
        let FeeParams {
            receiver,
            rate_parts,
            fixed_amount,
        } = desired.fee;
        actions.push(Action::SetFee {
            receiver,
            rate_parts,
            fixed_amount,
        });
    }
    if let Some(bridge) = desired.bridge {
        if bridge != observed.bridge {
            actions.push(Action::SetBridge(bridge));
        }
    }
    if let Some(referrer) = desired.referrer {
        if observed.referrer != Some(referrer) {
            actions.push(Action::SetReferrerMaxFee {
                max_rate_parts: referrer.max_rate_parts,
                max_native_fee: referrer.max_native_fee,
            });
        }
    }
    if let Some(manager) = desired.fee_manager {
        if observed.fee_manager != Some(manager) {
            actions.push(Action::SetFeeManager(manager));
        }
    }

    let mut seen = HashSet::new();
    for &executor in &desired.deprecated_executors {
        if seen.insert(executor) && observed.authorized_executors.contains(&executor) {
            actions.push(Action::revoke(executor));
        }
    }
    actions
}

/// Constructor-only differences, reported next to the actions.
pub fn drift(network: &NetworkConfig, observed: &ObservedState) -> Vec<Drift> {
    match network.wrapped_token {
        Some(expected) if observed.wrapped_token != Some(expected) => vec![Drift::WrappedToken {
            expected,
            actual: observed.wrapped_token,
        }],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;
    use routerctl_config::RouteVersion;
    use routerctl_types::{ChainFamily, ReferrerMaxFee, U256};

    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn route(executors: Vec<Address>, deprecated: Vec<Address>) -> RouteConfig {
        RouteConfig {
            version: RouteVersion::V3,
            router: addr(0xaa),
            bridge: None,
            fee: FeeParams::default(),
            referrer: None,
            fee_manager: None,
            executors,
            deprecated_executors: deprecated,
        }
    }

    fn observed(executors: &[Address]) -> ObservedState {
        ObservedState {
            authorized_executors: executors.iter().copied().collect(),
            ..ObservedState::default()
        }
    }

    /// What the router would look like after the actions are included.
    fn apply(observed: &ObservedState, actions: &[Action]) -> ObservedState {
        let mut state = observed.clone();
        for action in actions {
            match action {
                Action::Authorize {
                    executor,
                    authorized: true,
                } => {
                    state.authorized_executors.insert(*executor);
                }
                Action::Authorize {
                    executor,
                    authorized: false,
                } => {
                    state.authorized_executors.remove(executor);
                }
                Action::SetFee {
                    receiver,
                    rate_parts,
                    fixed_amount,
                } => {
                    state.fee = FeeParams {
                        receiver: *receiver,
                        rate_parts: *rate_parts,
                        fixed_amount: *fixed_amount,
                    };
                }
                Action::SetBridge(bridge) => state.bridge = *bridge,
                Action::SetReferrerMaxFee {
                    max_rate_parts,
                    max_native_fee,
                } => {
                    state.referrer = Some(ReferrerMaxFee {
                        max_rate_parts: *max_rate_parts,
                        max_native_fee: *max_native_fee,
                    });
                }
                Action::SetFeeManager(manager) => state.fee_manager = Some(*manager),
                Action::Deploy { .. } => unreachable!("diff never deploys"),
            }
        }
        state
    }

    #[test]
    fn adds_missing_executor() {
        let desired = route(vec![addr(0xa), addr(0xb)], vec![]);
        let actions = diff(&desired, &observed(&[addr(0xa)]));
        assert_eq!(actions, [Action::authorize(addr(0xb))]);
    }

    #[test]
    fn fee_is_set_as_a_whole() {
        let receiver = addr(0xfe);
        let mut desired = route(vec![], vec![]);
        desired.fee.receiver = receiver;
        let mut current = observed(&[]);
        current.fee = FeeParams {
            receiver,
            rate_parts: 7000.into(),
            fixed_amount: 100_000_000.into(),
        };

        let actions = diff(&desired, &current);
        assert_eq!(
            actions,
            [Action::SetFee {
                receiver,
                rate_parts: U256::zero(),
                fixed_amount: U256::zero(),
            }]
        );
    }

    #[test]
    fn revokes_deprecated_executor() {
        let desired = route(vec![addr(0xa)], vec![addr(0xf)]);
        let actions = diff(&desired, &observed(&[addr(0xa), addr(0xf)]));
        assert_eq!(actions, [Action::revoke(addr(0xf))]);
    }

    #[test]
    fn converged_router_yields_nothing() {
        let mut desired = route(vec![addr(0xa)], vec![addr(0xf)]);
        desired.bridge = Some(addr(0xb));
        desired.fee_manager = Some(addr(0xc));
        let mut current = observed(&[addr(0xa)]);
        current.bridge = addr(0xb);
        current.fee_manager = Some(addr(0xc));
        assert!(diff(&desired, &current).is_empty());
    }

    #[test]
    fn full_plan_order() {
        let mut desired = route(vec![addr(2), addr(1), addr(2)], vec![addr(9), addr(8)]);
        desired.fee.rate_parts = 3000.into();
        desired.bridge = Some(addr(0xb));
        desired.referrer = Some(ReferrerMaxFee {
            max_rate_parts: 10_000.into(),
            max_native_fee: 1.into(),
        });
        desired.fee_manager = Some(addr(0xc));
        let current = observed(&[addr(8), addr(9)]);

        let kinds: Vec<_> = diff(&desired, &current)
            .iter()
            .map(Action::kind)
            .collect();
        assert_eq!(
            kinds,
            [
                "authorize",
                "authorize",
                "set_fee",
                "set_bridge",
                "set_referrer_max_fee",
                "set_fee_manager",
                "revoke",
                "revoke",
            ]
        );
        assert_eq!(
            diff(&desired, &current)[..2],
            [Action::authorize(addr(2)), Action::authorize(addr(1))]
        );
    }

    #[test]
    fn undeclared_fields_are_left_alone() {
        let desired = route(vec![], vec![]);
        let mut current = observed(&[addr(0x42)]);
        current.bridge = addr(0xb);
        current.fee_manager = Some(addr(0xc));
        current.referrer = Some(ReferrerMaxFee::default());
        assert!(diff(&desired, &current).is_empty());
    }

    #[test]
    fn wrapped_token_drift() {
        let network = NetworkConfig {
            name: "Bsc".to_owned(),
            family: ChainFamily::Evm,
            wrapped_token: Some(addr(0x77)),
            routes: vec![route(vec![], vec![])],
        };
        let mut current = observed(&[]);
        current.wrapped_token = Some(addr(0x77));
        assert!(drift(&network, &current).is_empty());

        current.wrapped_token = Some(addr(0x78));
        assert_eq!(
            drift(&network, &current),
            [Drift::WrappedToken {
                expected: addr(0x77),
                actual: Some(addr(0x78)),
            }]
        );
    }

    fn arb_address() -> impl Strategy<Value = Address> {
        (1u8..12).prop_map(Address::repeat_byte)
    }

    fn arb_fee() -> impl Strategy<Value = FeeParams> {
        (arb_address(), 0u64..=1_000_000, 0u64..1_000).prop_map(|(receiver, rate, fixed)| {
            FeeParams {
                receiver,
                rate_parts: rate.into(),
                fixed_amount: fixed.into(),
            }
        })
    }

    fn arb_referrer() -> impl Strategy<Value = ReferrerMaxFee> {
        (0u64..3, 0u64..3).prop_map(|(rate, native)| ReferrerMaxFee {
            max_rate_parts: rate.into(),
            max_native_fee: native.into(),
        })
    }

    fn arb_case() -> impl Strategy<Value = (RouteConfig, ObservedState)> {
        (
            proptest::collection::vec(arb_address(), 0..6),
            proptest::collection::vec(arb_address(), 0..6),
            arb_fee(),
            proptest::option::of(arb_address()),
            proptest::option::of(arb_referrer()),
            proptest::option::of(arb_address()),
            proptest::collection::btree_set(arb_address(), 0..8),
            arb_fee(),
            arb_address(),
            proptest::option::of(arb_referrer()),
            proptest::option::of(arb_address()),
        )
            .prop_map(
                |(
                    executors,
                    deprecated,
                    fee,
                    bridge,
                    referrer,
                    manager,
                    authorized,
                    fee_now,
                    bridge_now,
                    referrer_now,
                    manager_now,
                )| {
                    let desired_set: BTreeSet<_> = executors.iter().copied().collect();
                    let deprecated = deprecated
                        .into_iter()
                        .filter(|executor| !desired_set.contains(executor))
                        .collect();
                    let mut desired = route(executors, deprecated);
                    desired.fee = fee;
                    desired.bridge = bridge;
                    desired.referrer = referrer;
                    desired.fee_manager = manager;
                    let observed = ObservedState {
                        authorized_executors: authorized,
                        fee: fee_now,
                        bridge: bridge_now,
                        referrer: referrer_now,
                        fee_manager: manager_now,
                        ..ObservedState::default()
                    };
                    (desired, observed)
                },
            )
    }

    proptest! {
        #[test]
        fn applying_the_plan_converges((desired, observed) in arb_case()) {
            let actions = diff(&desired, &observed);
            let after = apply(&observed, &actions);
            prop_assert!(diff(&desired, &after).is_empty());
            prop_assert_eq!(actions, diff(&desired, &observed));
        }

        #[test]
        fn authorizations_precede_revocations((desired, observed) in arb_case()) {
            let actions = diff(&desired, &observed);
            let last_grant = actions.iter().rposition(|action| {
                matches!(action, Action::Authorize { authorized: true, .. })
            });
            let first_revoke = actions.iter().position(|action| {
                matches!(action, Action::Authorize { authorized: false, .. })
            });
            if let (Some(grant), Some(revoke)) = (last_grant, first_revoke) {
                prop_assert!(grant < revoke);
            }
        }

        #[test]
        fn parameter_updates_keep_their_slot((desired, observed) in arb_case()) {
            let rank = |action: &Action| match action {
                Action::Authorize { authorized: true, .. } => 0,
                Action::SetFee { .. } => 1,
                Action::SetBridge(_) => 2,
                Action::SetReferrerMaxFee { .. } => 3,
                Action::SetFeeManager(_) => 4,
                Action::Authorize { authorized: false, .. } => 5,
                Action::Deploy { .. } => 6,
            };
            let ranks: Vec<_> = diff(&desired, &observed).iter().map(rank).collect();
            prop_assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]), "{ranks:?}");
            for update in 1..=4 {
                prop_assert!(ranks.iter().filter(|&&rank| rank == update).count() <= 1);
            }
            prop_assert!(!ranks.contains(&6));
        }
    }
}
