//! Proposal lifecycle against the simulated chain.

mod common;

use alloy_core::primitives::U256;
use common::{CHAIN_ID, CountingClient, config, hardhat, init_tracing, registry, simulated_client};
use govsmith_deploy::{
    Endpoint, GovernanceError, MemoryRegistry, Network, PipelineContext, Redeploy, SimulatedChain,
    chain::{ChainClient, call_one},
    governance::{
        DriverOptions, FileProposalLedger, GovernanceDriver, MemoryProposalLedger, ProposalLedger,
        ProposalState, VoteType,
    },
    standard::{DEFI_EXCHANGE, standard_proposal},
    workflows,
};
use tempdir::TempDir;

const MANUAL: DriverOptions = DriverOptions {
    advance_chain: false,
};

async fn deployed(
    network: &Network,
    client: &CountingClient<SimulatedChain>,
    registry: &mut MemoryRegistry,
) {
    let mut ctx = PipelineContext::connect(network, client, registry)
        .await
        .unwrap();
    workflows::deploy_all(&mut ctx, &config(), &Redeploy::None)
        .await
        .unwrap();
}

async fn withdraw_fee<C: ChainClient>(client: &C, exchange: alloy_core::primitives::Address) -> u64 {
    call_one(client, exchange, "getWithdrawFeePercentage() returns (uint8)", &[])
        .await
        .unwrap()
        .as_u64()
        .unwrap()
}

#[tokio::test]
async fn test_proposal_walks_the_state_machine() {
    init_tracing();
    let network = hardhat();
    let client = simulated_client();
    let mut registry = registry();
    deployed(&network, &client, &mut registry).await;

    let ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();
    let driver = GovernanceDriver::connect(&ctx, MANUAL).await.unwrap();
    let settings = *driver.settings();
    assert_eq!(settings.voting_delay, 1);
    assert_eq!(settings.voting_period, 5);
    assert_eq!(settings.min_delay, 3600);

    let exchange = ctx.address_of(DEFI_EXCHANGE).unwrap();
    assert_eq!(withdraw_fee(&client, exchange).await, 1);

    let request = standard_proposal(&ctx, &config().proposal).unwrap();
    let mut ledger = MemoryProposalLedger::new();

    let proposed = driver.propose(&request, &mut ledger).await.unwrap();
    assert_eq!(proposed.state, ProposalState::Pending);
    assert_eq!(proposed.id, request.id());
    assert_eq!(proposed.deadline, proposed.snapshot + settings.voting_period);
    assert_eq!(ledger.latest(CHAIN_ID).unwrap(), Some(request.id()));

    client
        .advance_blocks(settings.voting_delay + 1)
        .await
        .unwrap();
    assert_eq!(driver.state(proposed.id).await.unwrap(), ProposalState::Active);

    driver
        .vote(proposed.id, VoteType::For, "Good proposal!")
        .await
        .unwrap();
    client
        .advance_blocks(settings.voting_period + 1)
        .await
        .unwrap();
    assert_eq!(driver.state(proposed.id).await.unwrap(), ProposalState::Succeeded);

    let queued = driver.queue(proposed.id, &request).await.unwrap();
    assert_eq!(queued.state, ProposalState::Queued);

    client.advance_time(settings.min_delay + 1).await.unwrap();
    client.advance_blocks(1).await.unwrap();

    let executed = driver.execute(proposed.id, &request).await.unwrap();
    assert_eq!(executed.state, ProposalState::Executed);
    assert_eq!(withdraw_fee(&client, exchange).await, 5);
}

#[tokio::test]
async fn test_automatic_advancement() {
    let network = hardhat();
    let client = simulated_client();
    let mut registry = registry();
    deployed(&network, &client, &mut registry).await;

    let ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();
    let driver = GovernanceDriver::connect(&ctx, DriverOptions::for_network(true))
        .await
        .unwrap();
    let request = standard_proposal(&ctx, &config().proposal).unwrap();
    let mut ledger = MemoryProposalLedger::new();

    let proposed = driver.propose(&request, &mut ledger).await.unwrap();
    assert_eq!(proposed.state, ProposalState::Active);

    let voted = driver.vote(proposed.id, VoteType::For, "").await.unwrap();
    assert_eq!(voted.state, ProposalState::Succeeded);

    let executed = driver
        .queue_and_execute(proposed.id, &request)
        .await
        .unwrap();
    assert_eq!(executed.state, ProposalState::Executed);
}

#[tokio::test]
async fn test_queue_rejects_altered_description() {
    let network = hardhat();
    let client = simulated_client();
    let mut registry = registry();
    deployed(&network, &client, &mut registry).await;

    let ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();
    let driver = GovernanceDriver::connect(&ctx, DriverOptions::for_network(true))
        .await
        .unwrap();
    let request = standard_proposal(&ctx, &config().proposal).unwrap();
    let mut ledger = MemoryProposalLedger::new();

    let id = driver.propose(&request, &mut ledger).await.unwrap().id;
    driver.vote(id, VoteType::For, "").await.unwrap();

    let mut altered = request.clone();
    altered.description.push_str(" (amended)");

    let before = client.transactions();
    let err = driver.queue(id, &altered).await.unwrap_err();

    match err.downcast_ref::<GovernanceError>() {
        Some(GovernanceError::DescriptionHashMismatch { expected, computed }) => {
            assert_eq!(*expected, id);
            assert_eq!(*computed, altered.id());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(client.transactions(), before);
    assert_eq!(driver.state(id).await.unwrap(), ProposalState::Succeeded);
}

#[tokio::test]
async fn test_premature_execution_keeps_proposal_queued() {
    let network = hardhat();
    let client = simulated_client();
    let mut registry = registry();
    deployed(&network, &client, &mut registry).await;

    let ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();
    let driver = GovernanceDriver::connect(&ctx, MANUAL).await.unwrap();
    let settings = *driver.settings();
    let request = standard_proposal(&ctx, &config().proposal).unwrap();
    let mut ledger = MemoryProposalLedger::new();

    let id = driver.propose(&request, &mut ledger).await.unwrap().id;
    client.advance_blocks(settings.voting_delay + 1).await.unwrap();
    driver.vote(id, VoteType::For, "").await.unwrap();
    client.advance_blocks(settings.voting_period + 1).await.unwrap();
    driver.queue(id, &request).await.unwrap();

    let err = driver.execute(id, &request).await.unwrap_err();

    match err.downcast_ref::<GovernanceError>() {
        Some(GovernanceError::PrematureExecution { reason }) => {
            assert!(reason.contains("TimelockController: operation is not ready"))
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(driver.state(id).await.unwrap(), ProposalState::Queued);
}

#[tokio::test]
async fn test_vote_requires_active_proposal() {
    let network = hardhat();
    let client = simulated_client();
    let mut registry = registry();
    deployed(&network, &client, &mut registry).await;

    let ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();
    let driver = GovernanceDriver::connect(&ctx, MANUAL).await.unwrap();
    let request = standard_proposal(&ctx, &config().proposal).unwrap();
    let mut ledger = MemoryProposalLedger::new();

    let id = driver.propose(&request, &mut ledger).await.unwrap().id;
    let err = driver.vote(id, VoteType::For, "").await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GovernanceError>(),
        Some(GovernanceError::InsufficientVotingState {
            expected: ProposalState::Active,
            actual: ProposalState::Pending,
            ..
        })
    ));

    let err = driver.queue(id, &request).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GovernanceError>(),
        Some(GovernanceError::InsufficientVotingState {
            expected: ProposalState::Succeeded,
            ..
        })
    ));
}

#[tokio::test]
async fn test_live_network_rejects_advancement() {
    let network = Network {
        name: "sepolia".to_string(),
        chain_id: CHAIN_ID,
        simulated: false,
        confirmations: 6,
        endpoint: Endpoint::InProcess,
        dai_address: None,
        usdt_address: None,
    };
    let client = simulated_client();
    let mut registry = registry();
    let ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();

    let before = client.requests();
    let err = GovernanceDriver::connect(&ctx, DriverOptions { advance_chain: true })
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err.downcast_ref::<GovernanceError>(),
        Some(GovernanceError::NotSimulated { network, .. }) if network == "sepolia"
    ));
    assert_eq!(client.requests(), before);
}

#[tokio::test]
async fn test_create_proposal_records_ledger_file() {
    let temp_dir = TempDir::new("govsmith-test").expect("Failed to create temp dir");
    let path = temp_dir.path().join("proposals.json");

    let network = hardhat();
    let client = simulated_client();
    let mut registry = registry();
    let mut ledger = FileProposalLedger::new(&path);

    let mut ctx = PipelineContext::connect(&network, &client, &mut registry)
        .await
        .unwrap();
    let info = workflows::create_proposal(&mut ctx, &config(), &mut ledger)
        .await
        .unwrap();

    assert_eq!(info.state, ProposalState::Active);
    assert_ne!(info.id, U256::ZERO);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw[CHAIN_ID.to_string()][0], info.id.to_string());
}
