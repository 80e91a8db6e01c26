use std::fmt;

use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, U256},
};

use crate::Salt;

/// ABI tokens passed to a contract constructor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructorArgs(pub Vec<Token>);

impl ConstructorArgs {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// ABI encoding appended to the creation code.
    pub fn encode(&self) -> Bytes {
        abi::encode(&self.0).into()
    }
}

/// A single corrective step against a router. Produced by the diff engine
/// (or the deploy command) and consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Authorize {
        executor: Address,
        authorized: bool,
    },
    SetFee {
        receiver: Address,
        rate_parts: U256,
        fixed_amount: U256,
    },
    SetBridge(Address),
    SetReferrerMaxFee {
        max_rate_parts: U256,
        max_native_fee: U256,
    },
    SetFeeManager(Address),
    Deploy {
        contract: String,
        salt: Salt,
        args: ConstructorArgs,
    },
}

impl Action {
    pub fn authorize(executor: Address) -> Self {
        Self::Authorize {
            executor,
            authorized: true,
        }
    }

    pub fn revoke(executor: Address) -> Self {
        Self::Authorize {
            executor,
            authorized: false,
        }
    }

    /// Short label used in logs and metrics-like summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Authorize {
                authorized: true, ..
            } => "authorize",
            Action::Authorize {
                authorized: false, ..
            } => "revoke",
            Action::SetFee { .. } => "set_fee",
            Action::SetBridge(_) => "set_bridge",
            Action::SetReferrerMaxFee { .. } => "set_referrer_max_fee",
            Action::SetFeeManager(_) => "set_fee_manager",
            Action::Deploy { .. } => "deploy",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Authorize {
                executor,
                authorized,
            } => write!(f, "setAuthorization([{executor:?}], {authorized})"),
            Action::SetFee {
                receiver,
                rate_parts,
                fixed_amount,
            } => write!(f, "setFee({receiver:?}, {rate_parts}, {fixed_amount})"),
            Action::SetBridge(bridge) => write!(f, "setBridgeAddress({bridge:?})"),
            Action::SetReferrerMaxFee {
                max_rate_parts,
                max_native_fee,
            } => write!(f, "setReferrerMaxFee({max_rate_parts}, {max_native_fee})"),
            Action::SetFeeManager(manager) => write!(f, "setFeeManager({manager:?})"),
            Action::Deploy { contract, salt, .. } => write!(f, "deploy({contract}, salt {salt})"),
        }
    }
}
