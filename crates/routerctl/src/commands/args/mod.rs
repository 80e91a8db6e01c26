pub use self::{deploy::DeployArgs, reconcile::ReconcileArgs, status::StatusArgs};

mod deploy;
mod reconcile;
mod status;
