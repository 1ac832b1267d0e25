//! Drives a proposal through the governor's state machine.

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};

use super::{ProposalLedger, ProposalRequest, ProposalState, VoteType};
use crate::{
    abi::AbiValue,
    chain::{ChainClient, TxReceipt, call_one},
    context::PipelineContext,
    errors::{ChainError, GovernanceError},
    registry::DeploymentRegistry,
};

/// Registry name of the governor contract.
pub const GOVERNOR_CONTRACT: &str = "GovernorContract";

/// Revert reason of a timelock execution attempted before the delay elapsed.
const NOT_READY_REASON: &str = "operation is not ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Mine blocks and move the clock past each waiting period after the
    /// corresponding operation. Simulated networks only.
    pub advance_chain: bool,
}

impl DriverOptions {
    pub fn for_network(simulated: bool) -> Self {
        Self {
            advance_chain: simulated,
        }
    }
}

/// Governor parameters read from chain at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorSettings {
    pub governor: Address,
    pub timelock: Address,
    /// Blocks between proposal and voting start.
    pub voting_delay: u64,
    /// Blocks the vote stays open.
    pub voting_period: u64,
    /// Seconds between queueing and execution.
    pub min_delay: u64,
}

/// Snapshot of a proposal after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalInfo {
    pub id: U256,
    pub state: ProposalState,
    pub snapshot: u64,
    pub deadline: u64,
    pub receipt: TxReceipt,
}

pub struct GovernanceDriver<'c, 'a, C, R> {
    ctx: &'c PipelineContext<'a, C, R>,
    settings: GovernorSettings,
    options: DriverOptions,
}

impl<'c, 'a, C: ChainClient, R: DeploymentRegistry> GovernanceDriver<'c, 'a, C, R> {
    /// Connect to the governor recorded in the context's registry.
    ///
    /// Chain advancement on a live network is rejected here, before any
    /// transaction is sent.
    pub async fn connect(ctx: &'c PipelineContext<'a, C, R>, options: DriverOptions) -> Result<Self> {
        if options.advance_chain && !ctx.network.simulated {
            return Err(GovernanceError::NotSimulated {
                operation: "advance blocks or time",
                network: ctx.network.name.clone(),
            }
            .into());
        }

        let governor = ctx.address_of(GOVERNOR_CONTRACT)?;
        let client = ctx.client;

        let voting_delay = call_one(client, governor, "votingDelay() returns (uint256)", &[])
            .await?
            .as_u64()?;
        let voting_period = call_one(client, governor, "votingPeriod() returns (uint256)", &[])
            .await?
            .as_u64()?;
        let timelock = call_one(client, governor, "timelock() returns (address)", &[])
            .await?
            .as_address()?;
        let min_delay = call_one(client, timelock, "getMinDelay() returns (uint256)", &[])
            .await?
            .as_u64()?;

        let settings = GovernorSettings {
            governor,
            timelock,
            voting_delay,
            voting_period,
            min_delay,
        };

        tracing::debug!(?settings, ?options, "Governance driver connected");

        Ok(Self {
            ctx,
            settings,
            options,
        })
    }

    pub fn settings(&self) -> &GovernorSettings {
        &self.settings
    }

    /// Current state of a proposal.
    pub async fn state(&self, id: U256) -> Result<ProposalState> {
        let raw = call_one(
            self.ctx.client,
            self.settings.governor,
            "state(uint256) returns (uint8)",
            &[id.into()],
        )
        .await?
        .as_u64()?;

        ProposalState::from_chain(raw)
    }

    async fn block_param(&self, signature: &str, id: U256) -> Result<u64> {
        call_one(self.ctx.client, self.settings.governor, signature, &[id.into()])
            .await?
            .as_u64()
    }

    async fn info(&self, id: U256, receipt: TxReceipt) -> Result<ProposalInfo> {
        Ok(ProposalInfo {
            id,
            state: self.state(id).await?,
            snapshot: self
                .block_param("proposalSnapshot(uint256) returns (uint256)", id)
                .await?,
            deadline: self
                .block_param("proposalDeadline(uint256) returns (uint256)", id)
                .await?,
            receipt,
        })
    }

    async fn require_state(&self, id: U256, expected: ProposalState) -> Result<()> {
        let actual = self.state(id).await?;
        if actual != expected {
            return Err(GovernanceError::InsufficientVotingState {
                proposal: id,
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    fn check_id(id: U256, request: &ProposalRequest) -> Result<()> {
        let computed = request.id();
        if computed != id {
            return Err(GovernanceError::DescriptionHashMismatch {
                expected: id,
                computed,
            }
            .into());
        }
        Ok(())
    }

    async fn advance_blocks(&self, blocks: u64) -> Result<()> {
        if !self.options.advance_chain {
            return Ok(());
        }
        tracing::info!(blocks, "Moving blocks...");
        self.ctx.client.advance_blocks(blocks).await
    }

    async fn advance_time(&self, seconds: u64) -> Result<()> {
        if !self.options.advance_chain {
            return Ok(());
        }
        tracing::info!(seconds, "Moving time...");
        self.ctx.client.advance_time(seconds).await
    }

    async fn send_governor(&self, signature: &str, args: Vec<AbiValue>) -> Result<TxReceipt> {
        self.ctx
            .client
            .send(
                self.settings.governor,
                signature,
                &args,
                U256::ZERO,
                self.ctx.network.confirmations,
            )
            .await
    }

    /// Submit a proposal and record its id in `ledger`.
    ///
    /// With chain advancement enabled the voting delay is mined through, so the
    /// proposal is `Active` on return.
    pub async fn propose(
        &self,
        request: &ProposalRequest,
        ledger: &mut impl ProposalLedger,
    ) -> Result<ProposalInfo> {
        let id = request.id();

        tracing::info!(
            %id,
            description = %request.description,
            actions = request.actions.len(),
            "Proposing..."
        );

        let mut args = request.operation_args();
        args.push(request.description.clone().into());

        let receipt = self
            .send_governor("propose(address[],uint256[],bytes[],string) returns (uint256)", args)
            .await
            .context("Failed to submit proposal")?;

        ledger.append(self.ctx.chain_id(), id)?;

        self.advance_blocks(self.settings.voting_delay + 1).await?;

        let info = self.info(id, receipt).await?;

        tracing::info!(
            %id,
            state = %info.state,
            snapshot = info.snapshot,
            deadline = info.deadline,
            confirmations = info.receipt.confirmations,
            "Proposal submitted"
        );

        Ok(info)
    }

    /// Cast the sender's vote. The proposal must be `Active`.
    ///
    /// With chain advancement enabled the voting period is mined through, so
    /// the proposal is decided on return.
    pub async fn vote(
        &self,
        id: U256,
        support: VoteType,
        reason: &str,
    ) -> Result<ProposalInfo> {
        self.require_state(id, ProposalState::Active).await?;

        tracing::info!(%id, %support, reason, "Voting...");

        let receipt = self
            .send_governor(
                "castVoteWithReason(uint256,uint8,string) returns (uint256)",
                vec![id.into(), AbiValue::uint(support as u64), reason.into()],
            )
            .await
            .context("Failed to cast vote")?;

        self.advance_blocks(self.settings.voting_period + 1).await?;

        let info = self.info(id, receipt).await?;
        tracing::info!(%id, state = %info.state, "Vote cast");

        Ok(info)
    }

    /// Queue a succeeded proposal in the timelock.
    ///
    /// `request` must hash to `id`; a mismatch is reported before anything is
    /// sent.
    pub async fn queue(&self, id: U256, request: &ProposalRequest) -> Result<ProposalInfo> {
        Self::check_id(id, request)?;
        self.require_state(id, ProposalState::Succeeded).await?;

        tracing::info!(%id, "Queueing...");

        let mut args = request.operation_args();
        args.push(request.description_hash().into());

        let receipt = self
            .send_governor("queue(address[],uint256[],bytes[],bytes32) returns (uint256)", args)
            .await
            .context("Failed to queue proposal")?;

        let info = self.info(id, receipt).await?;
        tracing::info!(%id, state = %info.state, min_delay = self.settings.min_delay, "Proposal queued");

        Ok(info)
    }

    /// Execute a queued proposal.
    ///
    /// With chain advancement enabled the timelock delay is skipped first.
    /// A timelock rejection because the delay has not elapsed is reported as
    /// [`GovernanceError::PrematureExecution`] and leaves the proposal queued.
    pub async fn execute(&self, id: U256, request: &ProposalRequest) -> Result<ProposalInfo> {
        Self::check_id(id, request)?;
        self.require_state(id, ProposalState::Queued).await?;

        self.advance_time(self.settings.min_delay + 1).await?;
        self.advance_blocks(1).await?;

        tracing::info!(%id, "Executing...");

        let mut args = request.operation_args();
        args.push(request.description_hash().into());

        let receipt = match self
            .send_governor("execute(address[],uint256[],bytes[],bytes32) returns (uint256)", args)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(reason) = err
                    .downcast_ref::<ChainError>()
                    .and_then(ChainError::revert_reason)
                    .filter(|reason| reason.contains(NOT_READY_REASON))
                {
                    return Err(GovernanceError::PrematureExecution {
                        reason: reason.to_string(),
                    }
                    .into());
                }
                return Err(err.context("Failed to execute proposal"));
            }
        };

        let info = self.info(id, receipt).await?;
        tracing::info!(%id, state = %info.state, "Proposal executed");

        Ok(info)
    }

    /// Queue then execute.
    pub async fn queue_and_execute(
        &self,
        id: U256,
        request: &ProposalRequest,
    ) -> Result<ProposalInfo> {
        self.queue(id, request).await?;
        self.execute(id, request).await
    }
}
