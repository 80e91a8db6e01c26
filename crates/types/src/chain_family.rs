use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Backend a network is driven through. Decides the address encoding,
/// the transport and the salted-create primitive.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ValueEnum,
    EnumIter,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainFamily {
    #[default]
    Evm,
    Tron,
    #[serde(rename = "zk")]
    #[strum(serialize = "zk")]
    #[value(name = "zk")]
    ZkFactory,
}

impl ChainFamily {
    /// Prefix byte mixed into the CREATE2 preimage on this family.
    /// zkSync factories derive addresses differently and have no such byte.
    #[must_use]
    pub fn create2_prefix(&self) -> Option<u8> {
        match self {
            ChainFamily::Evm => Some(0xff),
            ChainFamily::Tron => Some(0x41),
            ChainFamily::ZkFactory => None,
        }
    }
}
