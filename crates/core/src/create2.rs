//! Salted-create address rules of the supported chain families.

use ethers::{types::H160, utils::keccak256};
use routerctl_types::{Address, H256};
use sha2::{Digest, Sha256};

/// zkSync system contract that performs deployments.
pub const CONTRACT_DEPLOYER_ADDRESS: Address = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x80, 0x06,
]);

const MAX_BYTECODE_LENGTH_IN_WORDS: usize = (1 << 16) - 1;

/// CREATE2 rule shared by EVM (`0xff`) and TVM (`0x41`):
/// `keccak256(prefix ++ deployer ++ salt ++ keccak256(init_code))[12..]`.
pub fn create2_address(prefix: u8, deployer: Address, salt: H256, init_code: &[u8]) -> Address {
    let mut bytes = [0u8; 85];
    bytes[0] = prefix;
    bytes[1..21].copy_from_slice(deployer.as_bytes());
    bytes[21..53].copy_from_slice(salt.as_bytes());
    bytes[53..].copy_from_slice(&keccak256(init_code));
    Address::from_slice(&keccak256(bytes)[12..])
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBytecodeError {
    #[error("Bytecode too long: {0} bytes")]
    TooLong(usize),
    #[error("Bytecode length {0} is not divisible by 32")]
    NotWordAligned(usize),
    #[error("Bytecode has an even number of 32-byte words")]
    EvenWordCount,
}

/// Versioned EraVM bytecode hash: `0x01`, `0x00`, the length in 32-byte words
/// (big endian u16), then the last 28 bytes of `sha256(bytecode)`.
pub fn zksync_bytecode_hash(bytecode: &[u8]) -> Result<H256, InvalidBytecodeError> {
    if bytecode.len() % 32 != 0 {
        return Err(InvalidBytecodeError::NotWordAligned(bytecode.len()));
    }
    let words = bytecode.len() / 32;
    if words > MAX_BYTECODE_LENGTH_IN_WORDS {
        return Err(InvalidBytecodeError::TooLong(bytecode.len()));
    }
    if words % 2 == 0 {
        return Err(InvalidBytecodeError::EvenWordCount);
    }

    let mut hash: [u8; 32] = Sha256::digest(bytecode).into();
    hash[0] = 1;
    hash[1] = 0;
    hash[2..4].copy_from_slice(&(words as u16).to_be_bytes());
    Ok(H256(hash))
}

/// Address the zkSync ContractDeployer assigns on `create2`.
pub fn zksync_create2_address(
    sender: Address,
    salt: H256,
    bytecode_hash: H256,
    constructor_input: &[u8],
) -> Address {
    let mut bytes = [0u8; 160];
    bytes[..32].copy_from_slice(&keccak256(b"zksyncCreate2"));
    bytes[44..64].copy_from_slice(sender.as_bytes());
    bytes[64..96].copy_from_slice(salt.as_bytes());
    bytes[96..128].copy_from_slice(bytecode_hash.as_bytes());
    bytes[128..].copy_from_slice(&keccak256(constructor_input));
    Address::from_slice(&keccak256(bytes)[12..])
}
