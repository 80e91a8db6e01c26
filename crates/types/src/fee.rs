use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Fee rates are expressed as parts of this denominator.
pub const FEE_DENOMINATOR: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    pub receiver: Address,
    pub rate_parts: U256,
    pub fixed_amount: U256,
}

/// Upper bounds a referrer may charge on top of the router fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerMaxFee {
    pub max_rate_parts: U256,
    pub max_native_fee: U256,
}
