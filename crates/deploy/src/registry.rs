//! Deployment registry: `(chain id, contract name) -> DeploymentResult`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{abi::AbiValue, errors::PlanError};

/// Recorded outcome of a deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Artifact the contract was deployed from.
    pub contract_name: String,
    pub address: Address,
    /// Constructor arguments, in order.
    pub constructor_args: Vec<AbiValue>,
    /// Whether the deployment reached the configured confirmation depth.
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub gas_used: u64,
    /// Unix timestamp at which the result was recorded.
    #[serde(default)]
    pub deployed_at: u64,
}

/// Storage for deployment results, keyed by network.
///
/// Implementations only store what they are given; deciding whether a step
/// may overwrite an entry is up to the caller.
pub trait DeploymentRegistry {
    fn get(&self, chain_id: u64, name: &str) -> Option<DeploymentResult>;

    fn put(&mut self, chain_id: u64, name: &str, result: DeploymentResult) -> Result<()>;

    fn has(&self, chain_id: u64, name: &str) -> bool {
        self.get(chain_id, name).is_some()
    }

    /// Like [`DeploymentRegistry::get`], failing with [`PlanError::MissingDeployment`].
    fn require(&self, chain_id: u64, name: &str) -> Result<DeploymentResult> {
        self.get(chain_id, name).ok_or_else(|| {
            PlanError::MissingDeployment {
                chain_id,
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Address of a recorded deployment.
    fn address_of(&self, chain_id: u64, name: &str) -> Result<Address> {
        Ok(self.require(chain_id, name)?.address)
    }
}

type Entries = BTreeMap<u64, BTreeMap<String, DeploymentResult>>;

/// Registry that lives for the duration of the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    entries: Entries,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeploymentRegistry for MemoryRegistry {
    fn get(&self, chain_id: u64, name: &str) -> Option<DeploymentResult> {
        self.entries.get(&chain_id)?.get(name).cloned()
    }

    fn put(&mut self, chain_id: u64, name: &str, result: DeploymentResult) -> Result<()> {
        self.entries
            .entry(chain_id)
            .or_default()
            .insert(name.to_string(), result);
        Ok(())
    }
}

/// Registry persisted as a JSON file, rewritten on every `put`.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
    entries: Entries,
}

impl FileRegistry {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read deployment registry {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse deployment registry JSON")?
        } else {
            Entries::new()
        };

        tracing::debug!(path = %path.display(), "Opened deployment registry");

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize deployment registry")?;

        std::fs::write(&self.path, json).with_context(|| {
            format!("Failed to write deployment registry to {}", self.path.display())
        })
    }
}

impl DeploymentRegistry for FileRegistry {
    fn get(&self, chain_id: u64, name: &str) -> Option<DeploymentResult> {
        self.entries.get(&chain_id)?.get(name).cloned()
    }

    fn put(&mut self, chain_id: u64, name: &str, result: DeploymentResult) -> Result<()> {
        self.entries
            .entry(chain_id)
            .or_default()
            .insert(name.to_string(), result);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn result(name: &str, byte: u8) -> DeploymentResult {
        DeploymentResult {
            contract_name: name.to_string(),
            address: Address::repeat_byte(byte),
            constructor_args: vec![AbiValue::uint(3600)],
            confirmed: true,
            tx_hash: None,
            block_number: 1,
            confirmations: 1,
            gas_used: 21000,
            deployed_at: 0,
        }
    }

    #[test]
    fn test_entries_are_keyed_by_network() {
        let mut registry = MemoryRegistry::new();
        registry.put(31337, "TimeLock", result("TimeLock", 1)).unwrap();

        assert!(registry.has(31337, "TimeLock"));
        assert!(!registry.has(11155111, "TimeLock"));
        assert!(!registry.has(31337, "GovernorContract"));
    }

    #[test]
    fn test_require_missing_deployment() {
        let registry = MemoryRegistry::new();
        let err = registry.require(31337, "GovernanceToken").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlanError>(),
            Some(PlanError::MissingDeployment { chain_id: 31337, name }) if name == "GovernanceToken"
        ));
    }

    #[test]
    fn test_file_registry_survives_reopen() {
        let temp_dir = TempDir::new("govsmith-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested/deployments.json");

        let mut registry = FileRegistry::open(&path).unwrap();
        registry.put(31337, "TimeLock", result("TimeLock", 1)).unwrap();
        registry.put(1, "TimeLock", result("TimeLock", 2)).unwrap();

        let reopened = FileRegistry::open(&path).unwrap();
        assert_eq!(reopened.get(31337, "TimeLock"), Some(result("TimeLock", 1)));
        assert_eq!(reopened.address_of(1, "TimeLock").unwrap(), Address::repeat_byte(2));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("31337").is_some());
    }
}
