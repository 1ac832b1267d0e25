//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_core::primitives::{Address, U256};
use anyhow::Result;
use govsmith_deploy::{
    HarnessConfig, MemoryRegistry, Network, SimulatedChain,
    abi::AbiValue,
    chain::{ChainClient, ChainNetwork, DeployedContract, TxReceipt},
};

pub const CHAIN_ID: u64 = 31337;

/// Chain client wrapper counting every request made through it.
pub struct CountingClient<C> {
    inner: C,
    requests: AtomicUsize,
    transactions: AtomicUsize,
}

impl<C> CountingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            requests: AtomicUsize::new(0),
            transactions: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Requests of any kind, reads included.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Deployments and state-changing calls.
    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    fn count(&self, transaction: bool) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if transaction {
            self.transactions.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl<C: ChainClient> ChainClient for CountingClient<C> {
    async fn network(&self) -> Result<ChainNetwork> {
        self.count(false);
        self.inner.network().await
    }

    fn sender(&self) -> Address {
        self.inner.sender()
    }

    async fn deploy(
        &self,
        contract: &str,
        args: &[AbiValue],
        confirmations: u64,
    ) -> Result<DeployedContract> {
        self.count(true);
        self.inner.deploy(contract, args, confirmations).await
    }

    async fn call(&self, to: Address, signature: &str, args: &[AbiValue]) -> Result<Vec<AbiValue>> {
        self.count(false);
        self.inner.call(to, signature, args).await
    }

    async fn send(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
        value: U256,
        confirmations: u64,
    ) -> Result<TxReceipt> {
        self.count(true);
        self.inner.send(to, signature, args, value, confirmations).await
    }

    async fn advance_blocks(&self, blocks: u64) -> Result<()> {
        self.count(false);
        self.inner.advance_blocks(blocks).await
    }

    async fn advance_time(&self, seconds: u64) -> Result<()> {
        self.count(false);
        self.inner.advance_time(seconds).await
    }
}

pub fn hardhat() -> Network {
    Network::in_process("hardhat", CHAIN_ID)
}

pub fn simulated_client() -> CountingClient<SimulatedChain> {
    CountingClient::new(SimulatedChain::new(CHAIN_ID, "hardhat"))
}

pub fn registry() -> MemoryRegistry {
    MemoryRegistry::new()
}

pub fn config() -> HarnessConfig {
    HarnessConfig::default()
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
