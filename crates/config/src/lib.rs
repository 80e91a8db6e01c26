pub use artifacts::*;
pub use chains::*;
pub use deployments::*;
pub use networks::*;

mod artifacts;
mod chains;
pub mod consts;
mod deployments;
mod networks;
pub mod traits;
