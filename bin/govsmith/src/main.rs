//! govsmith is a CLI tool to deploy a governed DeFi stack and drive its proposals.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;

use cli::{Cli, Command};
use govsmith_deploy::{
    DeploymentRegistry, Endpoint, FileRegistry, HarnessConfig, MemoryRegistry, Network,
    PipelineContext, SimulatedChain,
    chain::{ArtifactStore, ChainClient, RpcChainClient},
    governance::{FileProposalLedger, ProposalLedger},
    workflows,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut figment = HarnessConfig::figment(cli.config.as_deref().map(Path::new));
    if let Some(network) = &cli.network {
        figment = figment.merge(Serialized::default("network", network));
    }

    let config: HarnessConfig = figment.extract().context("Failed to load configuration")?;
    config.validate()?;

    let network = config.active_network()?;
    let ledger = FileProposalLedger::new(config.ledger_path());

    tracing::info!(
        network = %network.name,
        chain_id = network.chain_id,
        simulated = network.simulated,
        command = ?cli.command,
        "Starting govsmith..."
    );

    match &network.endpoint {
        Endpoint::InProcess => {
            let client = SimulatedChain::new(network.chain_id, network.name.clone());
            let mut registry = MemoryRegistry::new();
            run(&cli.command, &config, &network, &client, &mut registry, ledger).await
        }
        Endpoint::Rpc(url) => {
            let client = RpcChainClient::connect(
                url.clone(),
                network.name.clone(),
                config.sender_address()?,
                ArtifactStore::new(&config.artifacts_dir),
            )
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
            let mut registry = FileRegistry::open(config.registry_path())?;
            run(&cli.command, &config, &network, &client, &mut registry, ledger).await
        }
    }
}

async fn run<C, R>(
    command: &Command,
    config: &HarnessConfig,
    network: &Network,
    client: &C,
    registry: &mut R,
    mut ledger: impl ProposalLedger,
) -> Result<()>
where
    C: ChainClient,
    R: DeploymentRegistry,
{
    let mut ctx = PipelineContext::connect(network, client, registry).await?;

    match command {
        Command::DeployAll { .. } => {
            let outcome = workflows::deploy_all(&mut ctx, config, &command.redeploy()).await?;
            tracing::info!(
                deployed = outcome.plan.count(govsmith_deploy::StepStatus::Deployed),
                reused = outcome.plan.count(govsmith_deploy::StepStatus::Reused),
                wired = outcome.wiring.applied(),
                "Deployment complete"
            );
        }
        Command::CreateProposal => {
            let info = workflows::create_proposal(&mut ctx, config, &mut ledger).await?;
            tracing::info!(id = %info.id, state = %info.state, "Proposal created");
        }
        Command::VoteForProposal { support } => {
            let info = workflows::vote_for_proposal(&ctx, config, &ledger, *support).await?;
            tracing::info!(id = %info.id, state = %info.state, "Vote recorded");
        }
        Command::QueueAndExecute => {
            let info = workflows::queue_and_execute(&ctx, config, &ledger).await?;
            tracing::info!(id = %info.id, state = %info.state, "Proposal processed");
        }
    }

    Ok(())
}
