//! The operator workflows: deploy, propose, vote, queue and execute.

use alloy_core::primitives::U256;
use anyhow::{Context, Result};

use crate::{
    chain::{ChainClient, call_one},
    config::{HarnessConfig, Network},
    context::PipelineContext,
    governance::{
        DriverOptions, GovernanceDriver, ProposalInfo, ProposalLedger, ProposalState, VoteType,
    },
    plan::{PlanReport, Redeploy},
    registry::DeploymentRegistry,
    report,
    standard::{DEFI_EXCHANGE, standard_plan, standard_proposal, standard_wiring},
    wiring::WiringReport,
};

/// Reports of a `deploy_all` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub plan: PlanReport,
    pub wiring: WiringReport,
}

/// Deploy the governance stack and wire it.
pub async fn deploy_all<C, R>(
    ctx: &mut PipelineContext<'_, C, R>,
    config: &HarnessConfig,
    redeploy: &Redeploy,
) -> Result<DeployOutcome>
where
    C: ChainClient,
    R: DeploymentRegistry,
{
    if config.explorer_api_key.is_some() && !ctx.network.simulated {
        tracing::info!(
            network = %ctx.network.name,
            "Explorer API key configured; contract verification is not performed"
        );
    }

    let plan = standard_plan(ctx.network, &config.governance)?;
    let plan_report = plan.run(ctx, redeploy).await.context("Deployment failed")?;
    if !plan_report.stale.is_empty() {
        tracing::warn!(
            stale = ?plan_report.stale,
            "Some reused contracts point at replaced dependencies; rerun with --redeploy-step for each of them"
        );
    }

    let wiring_report = standard_wiring().run(ctx).await.context("Wiring failed")?;

    tracing::info!(
        "Deployment summary on {}:\n{}",
        ctx.network.name,
        report::deployment_summary(&plan_report)
    );

    if config.report_gas {
        tracing::info!(
            "Gas usage:\n{}",
            report::gas_report(&plan_report, &wiring_report)
        );
    }

    Ok(DeployOutcome {
        plan: plan_report,
        wiring: wiring_report,
    })
}

fn require_persistent(network: &Network, workflow: &str) -> Result<()> {
    if !network.is_persistent() {
        anyhow::bail!(
            "`{}` needs a node-backed network: state of the in-process network `{}` does not outlive the process. Start a node and use `localhost`",
            workflow,
            network.name
        );
    }
    Ok(())
}

fn latest_proposal(ledger: &impl ProposalLedger, network: &Network) -> Result<U256> {
    ledger
        .latest(network.chain_id)?
        .with_context(|| format!("No proposal recorded for network `{}`", network.name))
}

/// Submit the standard proposal and record it in the ledger.
///
/// On the in-process network the stack is deployed first.
pub async fn create_proposal<C, R>(
    ctx: &mut PipelineContext<'_, C, R>,
    config: &HarnessConfig,
    ledger: &mut impl ProposalLedger,
) -> Result<ProposalInfo>
where
    C: ChainClient,
    R: DeploymentRegistry,
{
    if !ctx.network.is_persistent() {
        tracing::info!(network = %ctx.network.name, "In-process network, deploying the stack first");
        deploy_all(ctx, config, &Redeploy::None).await?;
    }

    let driver =
        GovernanceDriver::connect(ctx, DriverOptions::for_network(ctx.network.simulated)).await?;
    let request = standard_proposal(ctx, &config.proposal)?;

    driver.propose(&request, ledger).await
}

/// Vote on the most recent proposal of the network.
pub async fn vote_for_proposal<C, R>(
    ctx: &PipelineContext<'_, C, R>,
    config: &HarnessConfig,
    ledger: &impl ProposalLedger,
    support: VoteType,
) -> Result<ProposalInfo>
where
    C: ChainClient,
    R: DeploymentRegistry,
{
    require_persistent(ctx.network, "vote-for-proposal")?;

    let id = latest_proposal(ledger, ctx.network)?;
    let driver =
        GovernanceDriver::connect(ctx, DriverOptions::for_network(ctx.network.simulated)).await?;

    driver.vote(id, support, &config.proposal.vote_reason).await
}

/// Queue and execute the most recent proposal, then read back the fee it set.
pub async fn queue_and_execute<C, R>(
    ctx: &PipelineContext<'_, C, R>,
    config: &HarnessConfig,
    ledger: &impl ProposalLedger,
) -> Result<ProposalInfo>
where
    C: ChainClient,
    R: DeploymentRegistry,
{
    require_persistent(ctx.network, "queue-and-execute")?;

    let id = latest_proposal(ledger, ctx.network)?;
    let driver =
        GovernanceDriver::connect(ctx, DriverOptions::for_network(ctx.network.simulated)).await?;
    let request = standard_proposal(ctx, &config.proposal)?;

    let info = driver.queue_and_execute(id, &request).await?;

    if info.state == ProposalState::Executed {
        let exchange = ctx.address_of(DEFI_EXCHANGE)?;
        let fee = call_one(
            ctx.client,
            exchange,
            "getWithdrawFeePercentage() returns (uint8)",
            &[],
        )
        .await?
        .as_u64()?;

        tracing::info!(withdraw_fee_percentage = fee, "DeFiExchange withdraw fee updated");
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{governance::MemoryProposalLedger, registry::MemoryRegistry, sim::SimulatedChain};

    #[tokio::test]
    async fn test_vote_needs_node_backed_network() {
        let network = Network::in_process("hardhat", 31337);
        let client = SimulatedChain::new(31337, "hardhat");
        let mut registry = MemoryRegistry::new();
        let ctx = PipelineContext::connect(&network, &client, &mut registry)
            .await
            .unwrap();

        let ledger = MemoryProposalLedger::new();
        let err = vote_for_proposal(&ctx, &HarnessConfig::default(), &ledger, VoteType::For)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("node-backed"));
    }

    #[tokio::test]
    async fn test_create_proposal_deploys_in_process() {
        let network = Network::in_process("hardhat", 31337);
        let client = SimulatedChain::new(31337, "hardhat");
        let mut registry = MemoryRegistry::new();
        let mut ledger = MemoryProposalLedger::new();
        let config = HarnessConfig::default();

        let mut ctx = PipelineContext::connect(&network, &client, &mut registry)
            .await
            .unwrap();
        let info = create_proposal(&mut ctx, &config, &mut ledger).await.unwrap();

        assert_eq!(info.state, ProposalState::Active);
        assert_eq!(ledger.latest(31337).unwrap(), Some(info.id));
        assert!(ctx.registry.has(31337, DEFI_EXCHANGE));
    }
}
