//! Pipeline context passed to every component.

use alloy_core::primitives::Address;
use anyhow::Result;

use crate::{chain::ChainClient, config::Network, registry::DeploymentRegistry};

/// Network identity, chain client and registry handle for one pipeline run.
pub struct PipelineContext<'a, C, R> {
    pub network: &'a Network,
    pub client: &'a C,
    pub registry: &'a mut R,
    /// Account every transaction is sent from.
    pub deployer: Address,
}

impl<'a, C: ChainClient, R: DeploymentRegistry> PipelineContext<'a, C, R> {
    /// Build a context, checking that the client is connected to the configured chain.
    pub async fn connect(network: &'a Network, client: &'a C, registry: &'a mut R) -> Result<Self> {
        let remote = client.network().await?;
        if remote.chain_id != network.chain_id {
            anyhow::bail!(
                "Endpoint reports {} but network `{}` is configured with chain id {}",
                remote,
                network.name,
                network.chain_id
            );
        }

        let deployer = client.sender();
        tracing::info!(
            network = %network.name,
            chain_id = network.chain_id,
            deployer = %deployer,
            simulated = network.simulated,
            "Pipeline context ready"
        );

        Ok(Self {
            network,
            client,
            registry,
            deployer,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id
    }

    /// Address of a contract recorded on this network.
    pub fn address_of(&self, name: &str) -> Result<Address> {
        self.registry.address_of(self.network.chain_id, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry::MemoryRegistry, sim::SimulatedChain};

    #[tokio::test]
    async fn test_rejects_chain_id_mismatch() {
        let network = Network::in_process("hardhat", 31337);
        let client = SimulatedChain::new(1, "mainnet-fork");
        let mut registry = MemoryRegistry::new();

        let err = PipelineContext::connect(&network, &client, &mut registry)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("mainnet-fork (chain id 1)"));
    }
}
