//! Harness configuration.
//!
//! Values are layered with figment: built-in defaults, then an optional
//! `Govsmith.toml`, then `GOVSMITH_*` environment variables (`__` separates
//! nested keys, e.g. `GOVSMITH_GOVERNANCE__MIN_DELAY=60`).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Config file read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "Govsmith.toml";

/// Prefix of the environment variables that override the config file.
pub const ENV_PREFIX: &str = "GOVSMITH_";

/// Confirmation depth on simulated networks when none is configured.
pub const SIMULATED_BLOCK_CONFIRMATIONS: u64 = 1;

/// Confirmation depth on live networks when none is configured.
pub const LIVE_BLOCK_CONFIRMATIONS: u64 = 6;

/// Chain id shared by the in-process and local development networks.
pub const DEVELOPMENT_CHAIN_ID: u64 = 31337;

/// Parameters of the governance contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    /// Timelock delay in seconds between queueing and execution.
    pub min_delay: u64,
    /// Voting period in blocks.
    pub voting_period: u64,
    /// Blocks between proposal creation and the start of voting.
    pub voting_delay: u64,
    /// Share of the past total supply that must vote, in percent.
    pub quorum_percentage: u64,
    /// Initial withdraw fee of the exchange, in percent.
    pub withdraw_fee_percentage: u8,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            min_delay: 3600,
            voting_period: 5,
            voting_delay: 1,
            quorum_percentage: 4,
            withdraw_fee_percentage: 1,
        }
    }
}

/// Content of the standard proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalParams {
    /// Withdraw fee the proposal sets on the exchange.
    pub new_withdraw_fee_percentage: u8,
    pub description: String,
    /// Reason attached to the vote.
    pub vote_reason: String,
}

impl Default for ProposalParams {
    fn default() -> Self {
        Self {
            new_withdraw_fee_percentage: 5,
            description: "Proposal #1: change the DeFiExchange withdraw fee percentage".to_string(),
            vote_reason: "Good proposal!".to_string(),
        }
    }
}

/// Per-network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    /// Whether blocks and time can be advanced on demand.
    #[serde(default)]
    pub simulated: bool,
    /// Defaults to 1 on simulated networks and 6 on live ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_confirmations: Option<u64>,
    /// JSON-RPC endpoint. A simulated network without one runs in-process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    /// Deployed DAI token. When unset on a simulated network a mock is deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dai_address: Option<Address>,
    /// Deployed USDT token. When unset on a simulated network a mock is deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usdt_address: Option<Address>,
}

impl NetworkConfig {
    fn simulated(chain_id: u64, rpc_url: Option<Url>) -> Self {
        Self {
            chain_id,
            simulated: true,
            block_confirmations: None,
            rpc_url,
            dai_address: None,
            usdt_address: None,
        }
    }

    fn live(chain_id: u64) -> Self {
        Self {
            chain_id,
            simulated: false,
            block_confirmations: None,
            rpc_url: None,
            dai_address: None,
            usdt_address: None,
        }
    }
}

fn builtin_networks() -> BTreeMap<String, NetworkConfig> {
    let localhost = Url::parse("http://127.0.0.1:8545").ok();

    BTreeMap::from([
        ("hardhat".to_string(), NetworkConfig::simulated(DEVELOPMENT_CHAIN_ID, None)),
        ("localhost".to_string(), NetworkConfig::simulated(DEVELOPMENT_CHAIN_ID, localhost)),
        ("sepolia".to_string(), NetworkConfig::live(11155111)),
        ("mainnet".to_string(), NetworkConfig::live(1)),
    ])
}

/// Where transactions for a network are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The in-process simulated chain.
    InProcess,
    Rpc(Url),
}

/// The selected network with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
    pub simulated: bool,
    pub confirmations: u64,
    pub endpoint: Endpoint,
    pub dai_address: Option<Address>,
    pub usdt_address: Option<Address>,
}

impl Network {
    /// An in-process simulated network, as used by tests.
    pub fn in_process(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
            simulated: true,
            confirmations: SIMULATED_BLOCK_CONFIRMATIONS,
            endpoint: Endpoint::InProcess,
            dai_address: None,
            usdt_address: None,
        }
    }

    /// Whether state survives the process, i.e. the network is node-backed.
    pub fn is_persistent(&self) -> bool {
        !matches!(self.endpoint, Endpoint::InProcess)
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Name of the network to operate on.
    pub network: String,
    /// Endpoint override for the selected network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    /// Hex private key of the sending account. The node must hold the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
    /// Block explorer API key. Accepted for compatibility; verification is not performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_api_key: Option<String>,
    /// Print a gas usage table after deployments.
    pub report_gas: bool,
    /// Directory holding the deployment registry and the proposal ledger.
    pub data_dir: PathBuf,
    /// Directory holding compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    pub governance: GovernanceParams,
    pub proposal: ProposalParams,
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            network: "hardhat".to_string(),
            rpc_url: None,
            signing_key: None,
            explorer_api_key: None,
            report_gas: false,
            data_dir: PathBuf::from("."),
            artifacts_dir: PathBuf::from("artifacts"),
            governance: GovernanceParams::default(),
            proposal: ProposalParams::default(),
            networks: builtin_networks(),
        }
    }
}

impl HarnessConfig {
    /// The layered configuration sources.
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)
            .extract()
            .context("Failed to load configuration")?;

        config.validate()?;

        tracing::debug!(network = %config.network, "Configuration loaded");
        Ok(config)
    }

    /// Check the configuration for the selected network.
    pub fn validate(&self) -> Result<()> {
        let network = self.active_network()?;

        if !network.simulated {
            if !network.is_persistent() {
                anyhow::bail!(
                    "Live network `{}` needs an endpoint: set `networks.{}.rpc_url` or `rpc_url`",
                    network.name,
                    network.name
                );
            }
            if network.dai_address.is_none() || network.usdt_address.is_none() {
                anyhow::bail!(
                    "Live network `{}` needs `dai_address` and `usdt_address`: token mocks are only deployed on simulated networks",
                    network.name
                );
            }
        }

        if network.confirmations == 0 {
            anyhow::bail!("`networks.{}.block_confirmations` must be at least 1", network.name);
        }

        let governance = &self.governance;
        if governance.voting_period == 0 {
            anyhow::bail!("`governance.voting_period` must be at least 1 block");
        }
        if governance.quorum_percentage > 100 {
            anyhow::bail!(
                "`governance.quorum_percentage` must be at most 100, got {}",
                governance.quorum_percentage
            );
        }
        if governance.withdraw_fee_percentage > 100 {
            anyhow::bail!(
                "`governance.withdraw_fee_percentage` must be at most 100, got {}",
                governance.withdraw_fee_percentage
            );
        }
        if self.proposal.new_withdraw_fee_percentage > 100 {
            anyhow::bail!(
                "`proposal.new_withdraw_fee_percentage` must be at most 100, got {}",
                self.proposal.new_withdraw_fee_percentage
            );
        }
        if self.proposal.description.is_empty() {
            anyhow::bail!("`proposal.description` must not be empty");
        }

        self.sender_address()?;

        Ok(())
    }

    /// Resolve the selected network with defaults applied.
    pub fn active_network(&self) -> Result<Network> {
        let config = self.networks.get(&self.network).with_context(|| {
            format!(
                "Unknown network `{}` (known: {})",
                self.network,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;

        let endpoint = match self.rpc_url.clone().or_else(|| config.rpc_url.clone()) {
            Some(url) => Endpoint::Rpc(url),
            None => Endpoint::InProcess,
        };

        let default_confirmations = if config.simulated {
            SIMULATED_BLOCK_CONFIRMATIONS
        } else {
            LIVE_BLOCK_CONFIRMATIONS
        };

        Ok(Network {
            name: self.network.clone(),
            chain_id: config.chain_id,
            simulated: config.simulated,
            confirmations: config.block_confirmations.unwrap_or(default_confirmations),
            endpoint,
            dai_address: config.dai_address,
            usdt_address: config.usdt_address,
        })
    }

    /// Account derived from the signing key, if one is configured.
    pub fn sender_address(&self) -> Result<Option<Address>> {
        self.signing_key
            .as_deref()
            .map(|key| {
                PrivateKeySigner::from_str(key.trim())
                    // The signer crate may sit on a newer primitives release.
                    .map(|signer| Address::from(signer.address().0.0))
                    .map_err(|_| anyhow::anyhow!("`signing_key` is not a valid private key"))
            })
            .transpose()
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("deployments.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("proposals.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_select_in_process_hardhat() {
        let config = HarnessConfig::default();
        config.validate().unwrap();

        let network = config.active_network().unwrap();
        assert_eq!(network.chain_id, 31337);
        assert!(network.simulated);
        assert_eq!(network.confirmations, 1);
        assert_eq!(network.endpoint, Endpoint::InProcess);
        assert!(!network.is_persistent());
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Govsmith.toml",
                r#"
                    network = "polygon"
                    report_gas = true

                    [governance]
                    min_delay = 60

                    [networks.polygon]
                    chain_id = 137
                    rpc_url = "https://polygon.example.org"
                    dai_address = "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"
                    usdt_address = "0xc2132d05d31c914a87c6611c10748aeb04b58e8f"
                "#,
            )?;
            jail.set_env("GOVSMITH_GOVERNANCE__VOTING_PERIOD", "10");

            let config = HarnessConfig::load(None).map_err(|e| e.to_string())?;
            let network = config.active_network().map_err(|e| e.to_string())?;

            assert!(config.report_gas);
            assert_eq!(config.governance.min_delay, 60);
            assert_eq!(config.governance.voting_period, 10);
            // untouched defaults survive the merge
            assert_eq!(config.governance.voting_delay, 1);
            assert!(config.networks.contains_key("hardhat"));

            assert_eq!(network.chain_id, 137);
            assert!(!network.simulated);
            assert_eq!(network.confirmations, 6);
            assert!(network.is_persistent());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("GOVSMITH_NETWORK", "goerli");
            let err = HarnessConfig::load(None).unwrap_err();
            assert!(format!("{:#}", err).contains("Unknown network `goerli`"));
            Ok(())
        });
    }

    #[test]
    fn test_live_network_needs_endpoint_and_tokens() {
        let mut config = HarnessConfig {
            network: "sepolia".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.rpc_url = Some(Url::parse("http://127.0.0.1:8545").unwrap());
        assert!(config.validate().is_err());

        let sepolia = config.networks.get_mut("sepolia").unwrap();
        sepolia.dai_address = Some(Address::repeat_byte(1));
        sepolia.usdt_address = Some(Address::repeat_byte(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_quorum_over_100_is_rejected() {
        let config = HarnessConfig {
            governance: GovernanceParams {
                quorum_percentage: 101,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signing_key_derives_sender() {
        let config = HarnessConfig {
            // first well-known development account
            signing_key: Some(
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
            ),
            ..Default::default()
        };
        assert_eq!(
            config.sender_address().unwrap(),
            Some(Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap())
        );

        let invalid = HarnessConfig {
            signing_key: Some("not-a-key".to_string()),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
