//! Conversion between the canonical 20-byte address form and the native
//! representation of each chain family.
//!
//! EVM and zkSync-style chains use the canonical form as is. Tron prefixes the
//! 20 bytes with `0x41` and renders the result either as base58check (`T...`)
//! or as 42 hex characters.

use std::{fmt, str::FromStr};

use base58::{FromBase58, ToBase58};
use ethers::types::Address;
use sha2::{Digest, Sha256};

use crate::ChainFamily;

pub const TRON_ADDRESS_PREFIX: u8 = 0x41;
const ADDRESS_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address `{0}` is not valid hex")]
    NotHex(String),
    #[error("address `{value}` has {len} bytes, expected {expected}")]
    WrongLength {
        value: String,
        len: usize,
        expected: usize,
    },
    #[error("address `{0}` is not valid base58")]
    NotBase58(String),
    #[error("address `{0}` has a bad base58check checksum")]
    BadChecksum(String),
    #[error("address `{value}` has prefix {prefix:#04x}, expected 0x41")]
    BadPrefix { value: String, prefix: u8 },
}

/// Rendering used for Tron native addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TronEncoding {
    #[default]
    Base58,
    Hex,
}

/// 21-byte Tron address: `0x41` followed by the canonical 20 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TronAddress(Address);

impl TronAddress {
    pub fn from_canonical(address: Address) -> Self {
        Self(address)
    }

    pub fn canonical(&self) -> Address {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN + 1] {
        let mut bytes = [0u8; ADDRESS_LEN + 1];
        bytes[0] = TRON_ADDRESS_PREFIX;
        bytes[1..].copy_from_slice(self.0.as_bytes());
        bytes
    }

    /// `41` followed by 40 hex characters, the form the Tron HTTP API accepts
    /// with `visible: false`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_base58(&self) -> String {
        let payload = self.to_bytes();
        let checksum = base58_checksum(&payload);
        let mut data = payload.to_vec();
        data.extend_from_slice(&checksum);
        data.to_base58()
    }

    pub fn encode(&self, encoding: TronEncoding) -> String {
        match encoding {
            TronEncoding::Base58 => self.to_base58(),
            TronEncoding::Hex => self.to_hex(),
        }
    }

    fn from_base58(value: &str) -> Result<Self, AddressError> {
        let data = value
            .from_base58()
            .map_err(|_| AddressError::NotBase58(value.to_owned()))?;
        if data.len() != ADDRESS_LEN + 1 + CHECKSUM_LEN {
            return Err(AddressError::WrongLength {
                value: value.to_owned(),
                len: data.len(),
                expected: ADDRESS_LEN + 1 + CHECKSUM_LEN,
            });
        }
        let (payload, checksum) = data.split_at(ADDRESS_LEN + 1);
        if base58_checksum(payload) != checksum {
            return Err(AddressError::BadChecksum(value.to_owned()));
        }
        Self::from_payload(value, payload)
    }

    fn from_hex(value: &str) -> Result<Self, AddressError> {
        let payload = hex::decode(value).map_err(|_| AddressError::NotHex(value.to_owned()))?;
        if payload.len() != ADDRESS_LEN + 1 {
            return Err(AddressError::WrongLength {
                value: value.to_owned(),
                len: payload.len(),
                expected: ADDRESS_LEN + 1,
            });
        }
        Self::from_payload(value, &payload)
    }

    fn from_payload(value: &str, payload: &[u8]) -> Result<Self, AddressError> {
        if payload[0] != TRON_ADDRESS_PREFIX {
            return Err(AddressError::BadPrefix {
                value: value.to_owned(),
                prefix: payload[0],
            });
        }
        Ok(Self(Address::from_slice(&payload[1..])))
    }
}

impl FromStr for TronAddress {
    type Err = AddressError;

    /// Accepts base58check, hex-41 (with or without `0x`) and the bare
    /// 20-byte canonical form used by hand-written config tables.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.starts_with('T') {
            return Self::from_base58(value);
        }
        let stripped = strip_hex_prefix(value);
        match stripped.len() {
            42 => Self::from_hex(stripped),
            _ => parse_canonical(value).map(Self),
        }
    }
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TronAddress({})", self.to_base58())
    }
}

fn base58_checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&digest[..CHECKSUM_LEN]);
    checksum
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parses the canonical form: exactly 20 bytes of hex after an optional `0x`.
pub fn parse_canonical(value: &str) -> Result<Address, AddressError> {
    let bytes = hex::decode(strip_hex_prefix(value.trim()))
        .map_err(|_| AddressError::NotHex(value.to_owned()))?;
    if bytes.len() != ADDRESS_LEN {
        return Err(AddressError::WrongLength {
            value: value.to_owned(),
            len: bytes.len(),
            expected: ADDRESS_LEN,
        });
    }
    Ok(Address::from_slice(&bytes))
}

/// Renders a canonical address in the family's native form. Tron addresses
/// come out as base58check.
pub fn to_native(canonical: &str, family: ChainFamily) -> Result<String, AddressError> {
    to_native_with(canonical, family, TronEncoding::default())
}

pub fn to_native_with(
    canonical: &str,
    family: ChainFamily,
    encoding: TronEncoding,
) -> Result<String, AddressError> {
    let address = parse_canonical(canonical)?;
    Ok(render_native(address, family, encoding))
}

pub fn render_native(address: Address, family: ChainFamily, encoding: TronEncoding) -> String {
    match family {
        ChainFamily::Evm | ChainFamily::ZkFactory => format!("{address:?}"),
        ChainFamily::Tron => TronAddress::from_canonical(address).encode(encoding),
    }
}

pub fn to_canonical(native: &str, family: ChainFamily) -> Result<Address, AddressError> {
    match family {
        ChainFamily::Evm | ChainFamily::ZkFactory => parse_canonical(native),
        ChainFamily::Tron => native.parse::<TronAddress>().map(|a| a.canonical()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use test_casing::test_casing;

    use super::*;

    // USDT contract on Tron mainnet.
    const USDT_BASE58: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const USDT_HEX: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";

    #[test]
    fn tron_known_address_decodes() {
        let canonical = to_canonical(USDT_BASE58, ChainFamily::Tron).unwrap();
        assert_eq!(
            format!("{canonical:?}"),
            "0xa614f803b6fd780986a42c78ec9c7f77e6ded13c"
        );
        assert_eq!(to_canonical(USDT_HEX, ChainFamily::Tron).unwrap(), canonical);

        let native = to_native(&format!("{canonical:?}"), ChainFamily::Tron).unwrap();
        assert_eq!(native, USDT_BASE58);
        let hex_native =
            to_native_with(&format!("{canonical:?}"), ChainFamily::Tron, TronEncoding::Hex)
                .unwrap();
        assert_eq!(hex_native, USDT_HEX);
    }

    #[test]
    fn tron_checksum_is_enforced() {
        // Last character changed.
        let broken = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6u";
        assert_matches!(
            to_canonical(broken, ChainFamily::Tron),
            Err(AddressError::BadChecksum(_))
        );
    }

    #[test]
    fn tron_prefix_is_enforced() {
        let wrong_prefix = "42a614f803b6fd780986a42c78ec9c7f77e6ded13c";
        assert_matches!(
            to_canonical(wrong_prefix, ChainFamily::Tron),
            Err(AddressError::BadPrefix { prefix: 0x42, .. })
        );
    }

    #[test_casing(3, [ChainFamily::Evm, ChainFamily::Tron, ChainFamily::ZkFactory])]
    fn canonical_length_is_enforced(family: ChainFamily) {
        assert_matches!(
            to_native("0x1234", family),
            Err(AddressError::WrongLength { len: 2, .. })
        );
        assert_matches!(to_native("0xzz", family), Err(AddressError::NotHex(_)));
    }

    #[test]
    fn evm_is_identity() {
        let value = "0x6258e4d2950757a749a4d4683a7342261ce12471";
        assert_eq!(to_native(value, ChainFamily::Evm).unwrap(), value);
        assert_eq!(
            format!("{:?}", to_canonical(value, ChainFamily::ZkFactory).unwrap()),
            value
        );
    }

    proptest! {
        #[test]
        fn native_round_trip(bytes in any::<[u8; 20]>(), hex_tron in any::<bool>()) {
            let address = Address::from(bytes);
            let canonical = format!("{address:?}");
            let encoding = if hex_tron { TronEncoding::Hex } else { TronEncoding::Base58 };
            for family in [ChainFamily::Evm, ChainFamily::Tron, ChainFamily::ZkFactory] {
                let native = to_native_with(&canonical, family, encoding).unwrap();
                prop_assert_eq!(to_canonical(&native, family).unwrap(), address);
            }
        }
    }
}
