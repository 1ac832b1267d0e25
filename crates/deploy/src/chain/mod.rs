//! Chain client interface.
//!
//! Everything the pipeline does on chain goes through [`ChainClient`]. Two
//! implementations exist: [`RpcChainClient`] for a JSON-RPC node and
//! [`SimulatedChain`](crate::sim::SimulatedChain) for the in-process network.

mod artifacts;
mod rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256, U256};
use anyhow::Result;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::abi::AbiValue;

pub use artifacts::{Artifact, ArtifactStore};
pub use rpc::RpcChainClient;

/// Identity of the chain a client is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{name} (chain id {chain_id})")]
pub struct ChainNetwork {
    pub chain_id: u64,
    pub name: String,
}

/// Receipt of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Confirmation depth observed when the wait completed.
    pub confirmations: u64,
    pub gas_used: u64,
}

/// A freshly deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub receipt: TxReceipt,
}

/// Capability to read and mutate a ledger.
///
/// State-changing methods resolve only once the transaction is `confirmations`
/// blocks deep. No method retries or times out on its own.
pub trait ChainClient: Send + Sync {
    /// The chain this client talks to.
    fn network(&self) -> impl Future<Output = Result<ChainNetwork>> + Send;

    /// The account transactions are sent from.
    fn sender(&self) -> Address;

    /// Deploy `contract` with constructor arguments.
    fn deploy(
        &self,
        contract: &str,
        args: &[AbiValue],
        confirmations: u64,
    ) -> impl Future<Output = Result<DeployedContract>> + Send;

    /// Read-only call; returns the decoded outputs of `signature`.
    fn call(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
    ) -> impl Future<Output = Result<Vec<AbiValue>>> + Send;

    /// State-changing call.
    fn send(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
        value: U256,
        confirmations: u64,
    ) -> impl Future<Output = Result<TxReceipt>> + Send;

    /// Mine `blocks` empty blocks. Simulated networks only.
    fn advance_blocks(&self, blocks: u64) -> impl Future<Output = Result<()>> + Send;

    /// Move the clock forward by `seconds`. Simulated networks only.
    fn advance_time(&self, seconds: u64) -> impl Future<Output = Result<()>> + Send;
}

/// Read a single value from a view function.
pub async fn call_one<C: ChainClient>(
    client: &C,
    to: Address,
    signature: &str,
    args: &[AbiValue],
) -> Result<AbiValue> {
    client
        .call(to, signature, args)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("`{}` returned no value", signature))
}
