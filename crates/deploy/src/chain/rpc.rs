//! Chain client for Ethereum JSON-RPC endpoints.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{ArtifactStore, ChainClient, ChainNetwork, DeployedContract, TxReceipt};
use crate::{
    abi::{AbiValue, decode_output, encode_call},
    errors::ChainError,
};

/// Timeout for a single RPC request. Confirmation waits poll without an overall timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between polls while waiting for a receipt or for confirmations.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Create an HTTP client configured for JSON-RPC requests.
fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Errors whose message mentions a revert become [`ChainError::Reverted`] with the
/// node's message untouched; other error responses become [`ChainError::Rpc`].
async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();

        if message.to_lowercase().contains("revert") {
            return Err(ChainError::Reverted { reason: message }.into());
        }

        return Err(ChainError::Rpc {
            method: method.to_string(),
            message,
        }
        .into());
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// The subset of a transaction receipt the harness needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    gas_used: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    status: u64,
    contract_address: Option<Address>,
}

/// Chain client backed by a JSON-RPC node.
///
/// Transactions are submitted with `eth_sendTransaction`; the node holds the
/// sender's key.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    name: String,
    sender: Address,
    artifacts: ArtifactStore,
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Connect to `url`. Without an explicit sender, the node's first account is used.
    pub async fn connect(
        url: Url,
        name: impl Into<String>,
        sender: Option<Address>,
        artifacts: ArtifactStore,
    ) -> anyhow::Result<Self> {
        let client = create_client()?;

        let sender = match sender {
            Some(sender) => sender,
            None => {
                let accounts: Vec<Address> =
                    json_rpc_call(&client, &url, "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                accounts
                    .into_iter()
                    .next()
                    .context("Node exposes no accounts and no signing key was configured")?
            }
        };

        tracing::debug!(url = %url, sender = %sender, "Connected to JSON-RPC endpoint");

        Ok(Self {
            client,
            url,
            name: name.into(),
            sender,
            artifacts,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> anyhow::Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let number: U256 = self.rpc("eth_blockNumber", vec![]).await?;
        u64::try_from(number).context("Block number does not fit in u64")
    }

    async fn send_transaction(&self, tx: Value) -> anyhow::Result<B256> {
        self.rpc("eth_sendTransaction", vec![tx]).await
    }

    /// Wait until `tx_hash` is mined, then until it is `confirmations` blocks deep.
    async fn wait_for_receipt(&self, tx_hash: B256, confirmations: u64) -> anyhow::Result<RawReceipt> {
        let receipt = loop {
            let receipt: Option<RawReceipt> = self
                .rpc("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
                .await?;
            if let Some(receipt) = receipt {
                break receipt;
            }
            tracing::trace!(tx_hash = %tx_hash, "Transaction not mined yet, polling...");
            tokio::time::sleep(self.poll_interval).await;
        };

        tracing::debug!(
            tx_hash = %tx_hash,
            block_number = receipt.block_number,
            "Transaction accepted into a block"
        );

        if receipt.status == 0 {
            return Err(ChainError::Reverted {
                reason: format!("transaction {} reverted", tx_hash),
            }
            .into());
        }

        let required = confirmations.max(1);
        loop {
            let head = self.block_number().await?;
            let depth = head.saturating_sub(receipt.block_number) + 1;
            if depth >= required {
                tracing::debug!(tx_hash = %tx_hash, depth, "Transaction confirmed");
                break;
            }
            tracing::trace!(tx_hash = %tx_hash, depth, required, "Waiting for confirmations...");
            tokio::time::sleep(self.poll_interval).await;
        }

        Ok(receipt)
    }
}

impl ChainClient for RpcChainClient {
    async fn network(&self) -> anyhow::Result<ChainNetwork> {
        let chain_id: U256 = self.rpc("eth_chainId", vec![]).await?;
        Ok(ChainNetwork {
            chain_id: u64::try_from(chain_id).context("Chain id does not fit in u64")?,
            name: self.name.clone(),
        })
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy(
        &self,
        contract: &str,
        args: &[AbiValue],
        confirmations: u64,
    ) -> anyhow::Result<DeployedContract> {
        let artifact = self.artifacts.load(contract)?;
        let data = artifact.deploy_data(args)?;

        let tx_hash = self
            .send_transaction(serde_json::json!({
                "from": self.sender,
                "data": data,
            }))
            .await
            .with_context(|| format!("Failed to submit deployment of {}", contract))?;

        tracing::info!(contract = %contract, tx_hash = %tx_hash, "Deployment transaction sent");

        let receipt = self.wait_for_receipt(tx_hash, confirmations).await?;
        let address = receipt
            .contract_address
            .with_context(|| format!("Receipt for {} has no contract address", tx_hash))?;

        Ok(DeployedContract {
            address,
            receipt: TxReceipt {
                tx_hash: receipt.transaction_hash,
                block_number: receipt.block_number,
                confirmations: confirmations.max(1),
                gas_used: receipt.gas_used,
            },
        })
    }

    async fn call(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Vec<AbiValue>> {
        let data = encode_call(signature, args)?;
        let output: Bytes = self
            .rpc(
                "eth_call",
                vec![
                    serde_json::json!({ "from": self.sender, "to": to, "data": data }),
                    serde_json::json!("latest"),
                ],
            )
            .await
            .with_context(|| format!("Call to {} on {} failed", signature, to))?;

        decode_output(signature, &output)
    }

    async fn send(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
        value: U256,
        confirmations: u64,
    ) -> anyhow::Result<TxReceipt> {
        let data = encode_call(signature, args)?;
        let tx_hash = self
            .send_transaction(serde_json::json!({
                "from": self.sender,
                "to": to,
                "data": data,
                "value": value,
            }))
            .await?;

        tracing::debug!(to = %to, function = %signature, tx_hash = %tx_hash, "Transaction sent");

        let receipt = self.wait_for_receipt(tx_hash, confirmations).await?;

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            confirmations: confirmations.max(1),
            gas_used: receipt.gas_used,
        })
    }

    async fn advance_blocks(&self, blocks: u64) -> anyhow::Result<()> {
        for _ in 0..blocks {
            let _: Value = self.rpc("evm_mine", vec![]).await?;
        }
        tracing::info!(blocks, "Moved blocks");
        Ok(())
    }

    async fn advance_time(&self, seconds: u64) -> anyhow::Result<()> {
        let _: Value = self
            .rpc("evm_increaseTime", vec![serde_json::json!(seconds)])
            .await?;
        tracing::info!(seconds, "Moved forward in time");
        Ok(())
    }
}
