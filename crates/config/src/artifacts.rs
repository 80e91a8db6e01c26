use std::{collections::HashMap, ops::Range, path::Path, sync::Arc};

use anyhow::Context;
use ethers::{
    abi::{
        token::{LenientTokenizer, Tokenizer},
        Abi, ParamType, Token,
    },
    types::Bytes,
    utils::keccak256,
};
use routerctl_common::files::read_json_file;
use routerctl_types::{to_canonical, ChainFamily, ConstructorArgs, H256};
use serde::Deserialize;
use xshell::Shell;

/// Immutables are single words in runtime code.
const IMMUTABLE_SLOT_LEN: usize = 32;

/// Hardhat-style compilation output for one contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
    #[serde(default)]
    pub deployed_bytecode: Bytes,
}

impl ContractArtifact {
    /// Bytecode followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, args: &ConstructorArgs) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&args.encode());
        code.into()
    }

    /// Hash of the runtime code, if the artifact carries it.
    pub fn runtime_code_hash(&self) -> Option<H256> {
        (!self.deployed_bytecode.is_empty()).then(|| H256(keccak256(&self.deployed_bytecode)))
    }

    /// Whether `code` is the runtime code of this contract. Compiled runtime
    /// code keeps zero words where constructors write immutables, so bytes
    /// inside zero runs of at least a word may differ. `None` if the artifact
    /// carries no runtime code.
    pub fn matches_runtime_code(&self, code: &[u8]) -> Option<bool> {
        let expected = self.deployed_bytecode.as_ref();
        if expected.is_empty() {
            return None;
        }
        if expected.len() != code.len() {
            return Some(false);
        }
        let placeholders = placeholder_ranges(expected);
        let matches = expected
            .iter()
            .zip(code)
            .enumerate()
            .all(|(i, (expected, actual))| {
                expected == actual || placeholders.iter().any(|range| range.contains(&i))
            });
        Some(matches)
    }

    pub fn constructor_params(&self) -> Vec<ParamType> {
        self.abi
            .constructor()
            .map(|constructor| {
                constructor
                    .inputs
                    .iter()
                    .map(|input| input.kind.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parses command-line style constructor arguments against the ABI.
    /// Address arguments may be given in the family's native form.
    pub fn parse_constructor_args(
        &self,
        raw: &[String],
        family: ChainFamily,
    ) -> anyhow::Result<ConstructorArgs> {
        let params = self.constructor_params();
        anyhow::ensure!(
            params.len() == raw.len(),
            "{} constructor takes {} arguments, got {}",
            self.contract_name,
            params.len(),
            raw.len()
        );
        let tokens = params
            .iter()
            .zip(raw)
            .enumerate()
            .map(|(i, (kind, value))| {
                parse_token(kind, value, family)
                    .with_context(|| format!("constructor argument #{i} `{value}` as {kind}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(ConstructorArgs::new(tokens))
    }
}

fn placeholder_ranges(code: &[u8]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < code.len() {
        if code[start] != 0 {
            start += 1;
            continue;
        }
        let end = code[start..]
            .iter()
            .position(|&byte| byte != 0)
            .map_or(code.len(), |len| start + len);
        if end - start >= IMMUTABLE_SLOT_LEN {
            ranges.push(start..end);
        }
        start = end;
    }
    ranges
}

fn parse_token(kind: &ParamType, value: &str, family: ChainFamily) -> anyhow::Result<Token> {
    match kind {
        ParamType::Address => Ok(Token::Address(to_canonical(value, family)?)),
        _ => Ok(LenientTokenizer::tokenize(kind, value)?),
    }
}

/// Artifacts indexed by contract name.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    by_name: HashMap<String, Arc<ContractArtifact>>,
}

impl Artifacts {
    /// Loads every artifact found under `dir`, recursively. Hardhat debug
    /// files and build info are skipped.
    pub fn load_dir(shell: &Shell, dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut artifacts = Self::default();
        let mut pending = vec![dir.as_ref().to_path_buf()];
        while let Some(dir) = pending.pop() {
            for path in shell
                .read_dir(&dir)
                .with_context(|| format!("failed to list {dir:?}"))?
            {
                if path.is_dir() {
                    if !path.ends_with("build-info") {
                        pending.push(path);
                    }
                    continue;
                }
                if !is_artifact_file(&path) {
                    continue;
                }
                match read_json_file::<ContractArtifact>(shell, &path) {
                    Ok(artifact) => artifacts.insert(artifact),
                    Err(err) => tracing::debug!("skipping {path:?}: {err:#}"),
                }
            }
        }
        Ok(artifacts)
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.by_name
            .insert(artifact.contract_name.clone(), Arc::new(artifact));
    }

    pub fn get(&self, contract: &str) -> Option<Arc<ContractArtifact>> {
        self.by_name.get(contract).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn is_artifact_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.ends_with(".json") && !name.ends_with(".dbg.json")
}

#[cfg(test)]
mod tests {
    use routerctl_types::Address;

    use super::*;

    fn router_artifact() -> ContractArtifact {
        serde_json::from_value(serde_json::json!({
            "contractName": "ButterRouterV4",
            "abi": [{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "_bridgeAddress", "type": "address" },
                    { "name": "_owner", "type": "address" },
                    { "name": "_wToken", "type": "address" }
                ]
            }],
            "bytecode": "0x6080604052",
            "deployedBytecode": "0x60806040"
        }))
        .unwrap()
    }

    #[test]
    fn constructor_args_accept_native_addresses() {
        let artifact = router_artifact();
        let args = artifact
            .parse_constructor_args(
                &[
                    "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_owned(),
                    "41a614f803b6fd780986a42c78ec9c7f77e6ded13c".to_owned(),
                    "0x0000000000000000000000000000000000000001".to_owned(),
                ],
                ChainFamily::Tron,
            )
            .unwrap();
        let usdt: Address = "0xa614f803b6fd780986a42c78ec9c7f77e6ded13c".parse().unwrap();
        assert_eq!(
            args.tokens(),
            &[
                Token::Address(usdt),
                Token::Address(usdt),
                Token::Address(Address::from_low_u64_be(1)),
            ]
        );

        let code = artifact.creation_code(&args);
        assert_eq!(&code[..5], &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(code.len(), 5 + 3 * 32);
    }

    #[test]
    fn immutables_may_differ_from_the_artifact() {
        let word = |byte: u8| [byte; IMMUTABLE_SLOT_LEN];
        let runtime = [&[0x60_u8, 0x80, 0x7f][..], &word(0)[..], &[0x00, 0x56][..]].concat();
        let mut artifact = router_artifact();
        artifact.deployed_bytecode = runtime.clone().into();

        assert_eq!(artifact.matches_runtime_code(&runtime), Some(true));
        let with_immutable = [&[0x60_u8, 0x80, 0x7f][..], &word(0x77)[..], &[0x00, 0x56][..]].concat();
        assert_eq!(artifact.matches_runtime_code(&with_immutable), Some(true));

        let other_opcode = [&[0x60_u8, 0x81, 0x7f][..], &word(0)[..], &[0x00, 0x56][..]].concat();
        assert_eq!(artifact.matches_runtime_code(&other_opcode), Some(false));
        assert_eq!(artifact.matches_runtime_code(&runtime[1..]), Some(false));

        // Short zero runs are ordinary code.
        artifact.deployed_bytecode = vec![0x60, 0x00, 0x00, 0x56].into();
        assert_eq!(artifact.matches_runtime_code(&[0x60, 0x01, 0x00, 0x56]), Some(false));

        artifact.deployed_bytecode = Bytes::default();
        assert_eq!(artifact.matches_runtime_code(&runtime), None);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let artifact = router_artifact();
        let err = artifact
            .parse_constructor_args(&["0x01".to_owned()], ChainFamily::Evm)
            .unwrap_err();
        assert!(err.to_string().contains("takes 3 arguments"), "{err}");
    }

    #[test]
    fn artifacts_are_loaded_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("contracts/ButterRouterV4.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(dir.path().join("build-info")).unwrap();
        let artifact = serde_json::json!({
            "contractName": "ButterRouterV4",
            "abi": [],
            "bytecode": "0x00",
            "deployedBytecode": "0x"
        });
        std::fs::write(nested.join("ButterRouterV4.json"), artifact.to_string()).unwrap();
        std::fs::write(nested.join("ButterRouterV4.dbg.json"), "{}").unwrap();
        std::fs::write(dir.path().join("build-info/abc.json"), "{}").unwrap();

        let shell = Shell::new().unwrap();
        let artifacts = Artifacts::load_dir(&shell, dir.path()).unwrap();
        assert_eq!(artifacts.len(), 1);
        let loaded = artifacts.get("ButterRouterV4").unwrap();
        assert_eq!(loaded.runtime_code_hash(), None);
    }
}
