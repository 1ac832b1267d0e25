//! Compiled contract artifacts (Hardhat / Foundry JSON output).

use std::path::{Path, PathBuf};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{abi::{AbiValue, encode_params}, errors::ChainError};

/// Bytecode may be a plain hex string (Hardhat) or an object (Foundry).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(Bytes),
    Object { object: Bytes },
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    abi: JsonAbi,
    bytecode: RawBytecode,
}

/// A compiled contract.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let raw: RawArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let bytecode = match raw.bytecode {
            RawBytecode::Hex(bytes) | RawBytecode::Object { object: bytes } => bytes,
        };

        if bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        Ok(Self {
            name: name.to_string(),
            abi: raw.abi,
            bytecode,
        })
    }

    /// Creation code followed by the ABI-encoded constructor arguments.
    pub fn deploy_data(&self, args: &[AbiValue]) -> Result<Bytes> {
        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        let encoded = encode_params(inputs, args)
            .with_context(|| format!("Failed to encode constructor arguments for {}", self.name))?;

        let mut data = self.bytecode.to_vec();
        data.extend_from_slice(&encoded);
        Ok(data.into())
    }
}

/// Looks up `<Name>.json` anywhere below an artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, name: &str) -> Result<Artifact> {
        let file_name = format!("{}.json", name);
        let path = find_file(&self.root, &file_name)?
            .ok_or_else(|| ChainError::UnknownContract(name.to_string()))
            .with_context(|| format!("No artifact named {} under {}", file_name, self.root.display()))?;

        tracing::debug!(contract = %name, path = %path.display(), "Loading artifact");
        Artifact::load(name, &path)
    }
}

fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let candidate = dir.join(file_name);
    if candidate.is_file() {
        return Ok(Some(candidate));
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read directory {}", dir.display()));
        }
    };

    let mut subdirs = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    subdirs.sort();

    for subdir in subdirs {
        if let Some(found) = find_file(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const TIMELOCK_ARTIFACT: &str = r#"{
        "contractName": "TimeLock",
        "abi": [
            {
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "minDelay", "type": "uint256", "internalType": "uint256" },
                    { "name": "proposers", "type": "address[]", "internalType": "address[]" },
                    { "name": "executors", "type": "address[]", "internalType": "address[]" },
                    { "name": "admin", "type": "address", "internalType": "address" }
                ]
            }
        ],
        "bytecode": "0x6080604052"
    }"#;

    #[test]
    fn test_load_nested_hardhat_artifact() {
        let temp_dir = TempDir::new("govsmith-test").expect("Failed to create temp dir");
        let nested = temp_dir.path().join("contracts/TimeLock.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("TimeLock.json"), TIMELOCK_ARTIFACT).unwrap();

        let store = ArtifactStore::new(temp_dir.path());
        let artifact = store.load("TimeLock").expect("Artifact should be found");

        assert_eq!(artifact.bytecode.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);

        let data = artifact
            .deploy_data(&[
                AbiValue::uint(3600),
                AbiValue::Array(vec![]),
                AbiValue::Array(vec![]),
                AbiValue::Address(alloy_core::primitives::Address::repeat_byte(1)),
            ])
            .unwrap();
        // 5 bytes of code, 4 head words and 2 empty array tails
        assert_eq!(data.len(), 5 + 6 * 32);
    }

    #[test]
    fn test_missing_artifact_is_unknown_contract() {
        let temp_dir = TempDir::new("govsmith-test").expect("Failed to create temp dir");
        let store = ArtifactStore::new(temp_dir.path());

        let err = store.load("GovernorContract").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChainError>(),
            Some(ChainError::UnknownContract(name)) if name == "GovernorContract"
        ));
    }
}
