//! Reconciliation engine for cross-chain router deployments.
//!
//! A [`ChainAdapter`](adapter::ChainAdapter) hides the differences between
//! EVM, Tron and zkSync-style chains. The [`diff`] module turns declared and
//! observed router state into an ordered list of actions, which the
//! [`Reconciler`](reconciler::Reconciler) applies and verifies.
//! [`DeterministicDeployer`](deployer::DeterministicDeployer) handles salted
//! deployments and their records.

pub mod abi;
pub mod adapter;
pub mod batch;
pub mod clients;
pub mod create2;
pub mod deployer;
pub mod diff;
mod error;
pub mod reconciler;

pub use error::ReconcileError;
