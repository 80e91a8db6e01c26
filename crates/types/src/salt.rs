use std::{fmt, str::FromStr};

use ethers::{types::H256, utils::keccak256};

/// Operator supplied label for a salted deployment.
///
/// Labels are hashed with keccak256 over their UTF-8 bytes. A `0x`-prefixed
/// 32-byte hex string is taken verbatim instead.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Salt {
    label: String,
    hash: H256,
}

impl Salt {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let hash = Self::parse_raw(&label).unwrap_or_else(|| H256(keccak256(label.as_bytes())));
        Self { label, hash }
    }

    fn parse_raw(label: &str) -> Option<H256> {
        let hex_part = label.strip_prefix("0x")?;
        if hex_part.len() != 64 {
            return None;
        }
        let bytes = hex::decode(hex_part).ok()?;
        Some(H256::from_slice(&bytes))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }
}

impl FromStr for Salt {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({:?} -> {:?})", self.label, self.hash)
    }
}
