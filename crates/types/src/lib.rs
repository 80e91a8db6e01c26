mod action;
pub mod address;
mod chain_family;
mod fee;
mod salt;

pub use action::*;
pub use address::{
    parse_canonical, render_native, to_canonical, to_native, to_native_with, AddressError,
    TronAddress, TronEncoding,
};
pub use chain_family::*;
pub use ethers::types::{Address, Bytes, H256, U256};
pub use fee::*;
pub use salt::*;
