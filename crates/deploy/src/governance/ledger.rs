//! Proposal ledger: an append-only list of proposal ids per network.
//!
//! The file format is a JSON object keyed by decimal chain id, each value a
//! list of decimal proposal ids in creation order:
//!
//! ```json
//! { "31337": ["2345...", "9876..."] }
//! ```

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use alloy_core::primitives::U256;
use anyhow::{Context, Result};
use fs2::FileExt;

pub trait ProposalLedger {
    /// Append `id` to the end of the network's list.
    fn append(&mut self, chain_id: u64, id: U256) -> Result<()>;

    /// Every id recorded for the network, oldest first.
    fn list(&self, chain_id: u64) -> Result<Vec<U256>>;

    /// The most recently appended id.
    fn latest(&self, chain_id: u64) -> Result<Option<U256>> {
        Ok(self.list(chain_id)?.pop())
    }
}

type Entries = BTreeMap<String, Vec<String>>;

fn parse_ids(ids: &[String]) -> Result<Vec<U256>> {
    ids.iter()
        .map(|id| {
            id.parse::<U256>()
                .with_context(|| format!("Invalid proposal id `{}` in ledger", id))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProposalLedger {
    entries: BTreeMap<u64, Vec<U256>>,
}

impl MemoryProposalLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProposalLedger for MemoryProposalLedger {
    fn append(&mut self, chain_id: u64, id: U256) -> Result<()> {
        self.entries.entry(chain_id).or_default().push(id);
        Ok(())
    }

    fn list(&self, chain_id: u64) -> Result<Vec<U256>> {
        Ok(self.entries.get(&chain_id).cloned().unwrap_or_default())
    }
}

/// Ledger stored in a JSON file.
///
/// Every append takes an exclusive lock on the file and rewrites it whole, so
/// concurrent processes cannot lose each other's entries.
#[derive(Debug, Clone)]
pub struct FileProposalLedger {
    path: PathBuf,
}

impl FileProposalLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(file: &mut File) -> Result<Entries> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read proposal ledger")?;

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).context("Failed to parse proposal ledger JSON")
    }
}

impl ProposalLedger for FileProposalLedger {
    fn append(&mut self, chain_id: u64, id: U256) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("Failed to open proposal ledger {}", self.path.display()))?;

        FileExt::lock_exclusive(&file).context("Failed to lock proposal ledger")?;

        let mut entries = Self::read_entries(&mut file)?;
        entries
            .entry(chain_id.to_string())
            .or_default()
            .push(id.to_string());

        let json =
            serde_json::to_string_pretty(&entries).context("Failed to serialize proposal ledger")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write proposal ledger {}", self.path.display()))?;
        file.sync_all()?;

        FileExt::unlock(&file).context("Failed to unlock proposal ledger")?;

        tracing::debug!(path = %self.path.display(), chain_id, %id, "Recorded proposal id");

        Ok(())
    }

    fn list(&self, chain_id: u64) -> Result<Vec<U256>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open proposal ledger {}", self.path.display()))?;
        FileExt::lock_shared(&file).context("Failed to lock proposal ledger")?;
        let entries = Self::read_entries(&mut file)?;
        FileExt::unlock(&file).context("Failed to unlock proposal ledger")?;

        entries
            .get(&chain_id.to_string())
            .map(|ids| parse_ids(ids))
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_latest_is_last_appended() {
        let mut ledger = MemoryProposalLedger::new();
        assert_eq!(ledger.latest(31337).unwrap(), None);

        ledger.append(31337, U256::from(1)).unwrap();
        ledger.append(31337, U256::from(2)).unwrap();
        ledger.append(1, U256::from(3)).unwrap();

        assert_eq!(ledger.latest(31337).unwrap(), Some(U256::from(2)));
        assert_eq!(ledger.list(31337).unwrap(), vec![U256::from(1), U256::from(2)]);
    }

    #[test]
    fn test_file_ledger_format() {
        let temp_dir = TempDir::new("govsmith-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("proposals.json");

        let big = U256::from_str_radix(
            "71482189217542867734458434925262925149744567834916785712549716361066735233066",
            10,
        )
        .unwrap();

        let mut ledger = FileProposalLedger::new(&path);
        ledger.append(31337, U256::from(7)).unwrap();
        ledger.append(31337, big).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["31337"][0], "7");
        assert_eq!(raw["31337"][1], big.to_string());

        let reopened = FileProposalLedger::new(&path);
        assert_eq!(reopened.latest(31337).unwrap(), Some(big));
        assert_eq!(reopened.latest(1).unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new("govsmith-test").expect("Failed to create temp dir");
        let ledger = FileProposalLedger::new(temp_dir.path().join("none.json"));
        assert!(ledger.list(31337).unwrap().is_empty());
    }
}
