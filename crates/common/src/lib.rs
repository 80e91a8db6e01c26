pub mod files;
pub mod observability;
pub mod retry;
pub mod spinner;
pub mod term;

pub use term::{error, logger};
