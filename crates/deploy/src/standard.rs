//! The governance stack: deployment steps, wiring and the sample proposal.

use anyhow::Result;

use crate::{
    abi::AbiValue,
    chain::ChainClient,
    config::{GovernanceParams, Network, ProposalParams},
    context::PipelineContext,
    governance::{GOVERNOR_CONTRACT, ProposalRequest},
    plan::{DeploymentPlan, DeploymentStep},
    registry::DeploymentRegistry,
    wiring::{AccountRef, WiringAction, WiringKind, WiringPlan},
};

pub const DAI_MOCK: &str = "DAITokenMock";
pub const USDT_MOCK: &str = "USDTTokenMock";
pub const GOVERNANCE_TOKEN: &str = "GovernanceToken";
pub const TIMELOCK: &str = "TimeLock";
pub const LIQUIDITY_POOL_NFT: &str = "LiquidityPoolNFT";
pub const DEFI_EXCHANGE: &str = "DeFiExchange";

const ERC20_MOCK_ARTIFACT: &str = "ERC20TokenMock";

/// Deployment steps for `network`.
///
/// Token mocks are only deployed on simulated networks that have no real token
/// configured; otherwise the exchange is built against the configured address.
pub fn standard_plan(network: &Network, governance: &GovernanceParams) -> Result<DeploymentPlan> {
    let dai_mock = DeploymentStep::new(DAI_MOCK)
        .contract(ERC20_MOCK_ARTIFACT)
        .arg("DAI")
        .arg("DAI")
        .when(|network| network.simulated && network.dai_address.is_none());

    let usdt_mock = DeploymentStep::new(USDT_MOCK)
        .contract(ERC20_MOCK_ARTIFACT)
        .arg("USDT")
        .arg("USDT")
        .when(|network| network.simulated && network.usdt_address.is_none());

    let token = DeploymentStep::new(GOVERNANCE_TOKEN);

    let timelock = DeploymentStep::new(TIMELOCK)
        .arg(AbiValue::uint(governance.min_delay))
        .arg(AbiValue::Array(Vec::new()))
        .arg(AbiValue::Array(Vec::new()))
        .arg_deployer();

    let governor = DeploymentStep::new(GOVERNOR_CONTRACT)
        .arg_address_of(GOVERNANCE_TOKEN)
        .arg_address_of(TIMELOCK)
        .arg(AbiValue::uint(governance.quorum_percentage))
        .arg(AbiValue::uint(governance.voting_period))
        .arg(AbiValue::uint(governance.voting_delay));

    let liquidity_pool_nft = DeploymentStep::new(LIQUIDITY_POOL_NFT);

    let exchange = DeploymentStep::new(DEFI_EXCHANGE);
    let exchange = match network.dai_address {
        Some(dai) => exchange.arg(dai),
        None => exchange.arg_address_of(DAI_MOCK),
    };
    let exchange = match network.usdt_address {
        Some(usdt) => exchange.arg(usdt),
        None => exchange.arg_address_of(USDT_MOCK),
    };
    let exchange = exchange.arg(AbiValue::uint(governance.withdraw_fee_percentage.into()));

    DeploymentPlan::new(vec![
        dai_mock,
        usdt_mock,
        token,
        timelock,
        governor,
        liquidity_pool_nft,
        exchange,
    ])
}

fn contract(name: &str) -> AccountRef {
    AccountRef::Contract(name.to_string())
}

/// Wiring that hands control of the stack to the governor.
///
/// The deployer's timelock admin role is revoked last, so a bad grant can
/// still be fixed by re-running after it.
pub fn standard_wiring() -> WiringPlan {
    WiringPlan::new(vec![
        WiringAction::new(
            "Delegate GovernanceToken votes to the deployer",
            WiringKind::Delegate {
                token: GOVERNANCE_TOKEN.to_string(),
                delegatee: AccountRef::Deployer,
            },
        ),
        WiringAction::new(
            "Grant TimeLock PROPOSER_ROLE to GovernorContract",
            WiringKind::GrantRole {
                contract: TIMELOCK.to_string(),
                role: "PROPOSER_ROLE".to_string(),
                account: contract(GOVERNOR_CONTRACT),
            },
        ),
        WiringAction::new(
            "Grant TimeLock EXECUTOR_ROLE to everyone",
            WiringKind::GrantRole {
                contract: TIMELOCK.to_string(),
                role: "EXECUTOR_ROLE".to_string(),
                account: AccountRef::Zero,
            },
        ),
        WiringAction::new(
            "Transfer DeFiExchange ownership to TimeLock",
            WiringKind::TransferOwnership {
                contract: DEFI_EXCHANGE.to_string(),
                new_owner: contract(TIMELOCK),
            },
        ),
        WiringAction::new(
            "Set DeFiExchange as GovernanceToken staking contract",
            WiringKind::Initialize {
                contract: GOVERNANCE_TOKEN.to_string(),
                signature: "initialize(address)".to_string(),
                args: vec![contract(DEFI_EXCHANGE)],
                probe: "s_stakingContractAddress() returns (address)".to_string(),
            },
        ),
        WiringAction::new(
            "Set DeFiExchange as LiquidityPoolNFT liquidity pool",
            WiringKind::Initialize {
                contract: LIQUIDITY_POOL_NFT.to_string(),
                signature: "initialize(address)".to_string(),
                args: vec![contract(DEFI_EXCHANGE)],
                probe: "getLiquidityPoolContractAddress() returns (address)".to_string(),
            },
        ),
        WiringAction::new(
            "Revoke TimeLock TIMELOCK_ADMIN_ROLE from the deployer",
            WiringKind::RevokeRole {
                contract: TIMELOCK.to_string(),
                role: "TIMELOCK_ADMIN_ROLE".to_string(),
                account: AccountRef::Deployer,
            },
        ),
    ])
}

/// Proposal changing the exchange withdraw fee.
pub fn standard_proposal<C, R>(
    ctx: &PipelineContext<'_, C, R>,
    params: &ProposalParams,
) -> Result<ProposalRequest>
where
    C: ChainClient,
    R: DeploymentRegistry,
{
    let exchange = ctx.address_of(DEFI_EXCHANGE)?;

    ProposalRequest::new(params.description.clone()).call(
        exchange,
        "changeWithdrawFeePercentage(uint8)",
        &[AbiValue::uint(params.new_withdraw_fee_percentage.into())],
    )
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;

    use super::*;
    use crate::config::Endpoint;

    #[test]
    fn test_simulated_plan_order() {
        let network = Network::in_process("hardhat", 31337);
        let plan = standard_plan(&network, &GovernanceParams::default()).unwrap();

        assert_eq!(
            plan.order(),
            vec![
                DAI_MOCK,
                USDT_MOCK,
                GOVERNANCE_TOKEN,
                TIMELOCK,
                GOVERNOR_CONTRACT,
                LIQUIDITY_POOL_NFT,
                DEFI_EXCHANGE,
            ]
        );
    }

    #[test]
    fn test_live_plan_uses_configured_tokens() {
        let network = Network {
            name: "sepolia".to_string(),
            chain_id: 11155111,
            simulated: false,
            confirmations: 6,
            endpoint: Endpoint::Rpc("https://rpc.sepolia.org".parse().unwrap()),
            dai_address: Some(Address::repeat_byte(0xda)),
            usdt_address: Some(Address::repeat_byte(0x07)),
        };
        let plan = standard_plan(&network, &GovernanceParams::default()).unwrap();

        let exchange = plan.steps().find(|s| s.name() == DEFI_EXCHANGE).unwrap();
        assert!(exchange.requirements().is_empty());

        let mocks: Vec<_> = plan
            .steps()
            .filter(|s| s.contract_name() == ERC20_MOCK_ARTIFACT)
            .collect();
        assert_eq!(mocks.len(), 2);
        assert!(mocks.iter().all(|s| !s.applies_to(&network)));
    }

    #[test]
    fn test_admin_revoked_last() {
        let wiring = standard_wiring();
        assert_eq!(wiring.actions().len(), 7);
        assert!(matches!(
            wiring.actions().last().map(|a| &a.kind),
            Some(WiringKind::RevokeRole { role, .. }) if role == "TIMELOCK_ADMIN_ROLE"
        ));
    }
}
