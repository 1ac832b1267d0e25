use std::collections::{HashMap, HashSet};

use alloy_core::primitives::{Address, B256, Bytes, U256};

use super::{
    contracts::unhandled,
    revert, timelock_salt,
    world::{Env, World},
};
use crate::{
    abi::{AbiValue, description_hash, hash_proposal},
    governance::{ProposalState, VoteType},
};

#[derive(Debug, Clone, Default)]
struct ProposalCore {
    snapshot: u64,
    deadline: u64,
    executed: bool,
    canceled: bool,
}

#[derive(Debug, Clone, Default)]
struct ProposalVotes {
    against: U256,
    for_votes: U256,
    abstain: U256,
    voters: HashSet<Address>,
}

struct ProposalCall {
    targets: Vec<Address>,
    values: Vec<U256>,
    calldatas: Vec<Bytes>,
}

impl ProposalCall {
    fn decode(args: &[AbiValue]) -> anyhow::Result<Self> {
        Ok(Self {
            targets: args[0]
                .as_array()?
                .iter()
                .map(AbiValue::as_address)
                .collect::<anyhow::Result<_>>()?,
            values: args[1]
                .as_array()?
                .iter()
                .map(AbiValue::as_uint)
                .collect::<anyhow::Result<_>>()?,
            calldatas: args[2]
                .as_array()?
                .iter()
                .map(|c| c.as_bytes().cloned())
                .collect::<anyhow::Result<_>>()?,
        })
    }

    fn id(&self, description_hash: B256) -> U256 {
        hash_proposal(&self.targets, &self.values, &self.calldatas, description_hash)
    }

    /// Arguments for the timelock batch functions.
    fn batch_args(&self, salt: B256) -> Vec<AbiValue> {
        vec![
            AbiValue::Array(self.targets.iter().copied().map(AbiValue::from).collect()),
            AbiValue::Array(self.values.iter().copied().map(AbiValue::from).collect()),
            AbiValue::Array(self.calldatas.iter().cloned().map(AbiValue::from).collect()),
            B256::ZERO.into(),
            salt.into(),
        ]
    }
}

/// `GovernorContract(token, timelock, quorumPercentage, votingPeriod, votingDelay)`
///
/// Block-number clock, simple counting, quorum as a fraction of the past total
/// supply, and execution through the timelock.
#[derive(Debug, Clone)]
pub(crate) struct Governor {
    token: Address,
    timelock: Address,
    quorum_numerator: U256,
    voting_period: u64,
    voting_delay: u64,
    proposals: HashMap<U256, ProposalCore>,
    votes: HashMap<U256, ProposalVotes>,
    timelock_ids: HashMap<U256, B256>,
}

impl Governor {
    pub const CONSTRUCTOR: &'static str =
        "GovernorContract(address,address,uint256,uint256,uint256)";

    pub const SIGNATURES: &'static [&'static str] = &[
        "name() returns (string)",
        "token() returns (address)",
        "timelock() returns (address)",
        "votingDelay() returns (uint256)",
        "votingPeriod() returns (uint256)",
        "proposalThreshold() returns (uint256)",
        "quorumNumerator() returns (uint256)",
        "quorum(uint256) returns (uint256)",
        "hashProposal(address[],uint256[],bytes[],bytes32) returns (uint256)",
        "state(uint256) returns (uint8)",
        "proposalSnapshot(uint256) returns (uint256)",
        "proposalDeadline(uint256) returns (uint256)",
        "proposalEta(uint256) returns (uint256)",
        "proposalVotes(uint256) returns (uint256,uint256,uint256)",
        "hasVoted(uint256,address) returns (bool)",
        "getVotes(address,uint256) returns (uint256)",
        "propose(address[],uint256[],bytes[],string) returns (uint256)",
        "castVote(uint256,uint8) returns (uint256)",
        "castVoteWithReason(uint256,uint8,string) returns (uint256)",
        "queue(address[],uint256[],bytes[],bytes32) returns (uint256)",
        "execute(address[],uint256[],bytes[],bytes32) returns (uint256)",
    ];

    pub fn new(args: &[AbiValue]) -> anyhow::Result<Self> {
        let quorum_numerator = args[2].as_uint()?;
        if quorum_numerator > U256::from(100) {
            return Err(revert(
                "GovernorVotesQuorumFraction: quorumNumerator over quorumDenominator",
            ));
        }

        Ok(Self {
            token: args[0].as_address()?,
            timelock: args[1].as_address()?,
            quorum_numerator,
            voting_period: args[3].as_u64()?,
            voting_delay: args[4].as_u64()?,
            proposals: HashMap::new(),
            votes: HashMap::new(),
            timelock_ids: HashMap::new(),
        })
    }

    fn proposal(&self, id: U256) -> anyhow::Result<&ProposalCore> {
        self.proposals
            .get(&id)
            .ok_or_else(|| revert("Governor: unknown proposal id"))
    }

    fn quorum(&self, world: &mut World, env: &Env, block: u64) -> anyhow::Result<U256> {
        let supply = world
            .call_fn_one(
                env.this,
                self.token,
                "getPastTotalSupply(uint256) returns (uint256)",
                &[AbiValue::uint(block)],
            )?
            .as_uint()?;
        Ok(supply * self.quorum_numerator / U256::from(100))
    }

    fn past_votes(&self, world: &mut World, env: &Env, account: Address, block: u64) -> anyhow::Result<U256> {
        world
            .call_fn_one(
                env.this,
                self.token,
                "getPastVotes(address,uint256) returns (uint256)",
                &[account.into(), AbiValue::uint(block)],
            )?
            .as_uint()
    }

    fn timelock_view(&self, world: &mut World, env: &Env, function: &str, id: B256) -> anyhow::Result<AbiValue> {
        world.call_fn_one(env.this, self.timelock, function, &[id.into()])
    }

    fn state(&self, world: &mut World, env: &Env, id: U256) -> anyhow::Result<ProposalState> {
        let proposal = self.proposal(id)?;

        if proposal.executed {
            return Ok(ProposalState::Executed);
        }
        if proposal.canceled {
            return Ok(ProposalState::Canceled);
        }
        if proposal.snapshot >= env.block {
            return Ok(ProposalState::Pending);
        }
        if proposal.deadline >= env.block {
            return Ok(ProposalState::Active);
        }

        let votes = self.votes.get(&id).cloned().unwrap_or_default();
        let quorum_reached = self.quorum(world, env, proposal.snapshot)? <= votes.for_votes + votes.abstain;
        if !quorum_reached || votes.for_votes <= votes.against {
            return Ok(ProposalState::Defeated);
        }

        let Some(&queue_id) = self.timelock_ids.get(&id) else {
            return Ok(ProposalState::Succeeded);
        };
        if self
            .timelock_view(world, env, "isOperationDone(bytes32) returns (bool)", queue_id)?
            .as_bool()?
        {
            Ok(ProposalState::Executed)
        } else if self
            .timelock_view(world, env, "isOperationPending(bytes32) returns (bool)", queue_id)?
            .as_bool()?
        {
            Ok(ProposalState::Queued)
        } else {
            Ok(ProposalState::Canceled)
        }
    }

    fn propose(&mut self, env: &Env, args: &[AbiValue]) -> anyhow::Result<U256> {
        let call = ProposalCall::decode(args)?;
        if call.targets.len() != call.values.len() || call.targets.len() != call.calldatas.len() {
            return Err(revert("Governor: invalid proposal length"));
        }
        if call.targets.is_empty() {
            return Err(revert("Governor: empty proposal"));
        }

        let id = call.id(description_hash(args[3].as_str()?));
        if self.proposals.contains_key(&id) {
            return Err(revert("Governor: proposal already exists"));
        }

        let snapshot = env.block + self.voting_delay;
        self.proposals.insert(
            id,
            ProposalCore {
                snapshot,
                deadline: snapshot + self.voting_period,
                ..Default::default()
            },
        );

        tracing::debug!(proposal_id = %id, proposer = %env.sender, snapshot, "Simulated proposal created");
        Ok(id)
    }

    fn cast_vote(&mut self, world: &mut World, env: &Env, id: U256, support: u64) -> anyhow::Result<U256> {
        if self.state(world, env, id)? != ProposalState::Active {
            return Err(revert("Governor: vote not currently active"));
        }

        let snapshot = self.proposal(id)?.snapshot;
        let weight = self.past_votes(world, env, env.sender, snapshot)?;

        let votes = self.votes.entry(id).or_default();
        if votes.voters.contains(&env.sender) {
            return Err(revert("GovernorVotingSimple: vote already cast"));
        }

        let support = u8::try_from(support)
            .ok()
            .and_then(VoteType::from_repr)
            .ok_or_else(|| revert("GovernorVotingSimple: invalid value for enum VoteType"))?;

        votes.voters.insert(env.sender);
        match support {
            VoteType::Against => votes.against += weight,
            VoteType::For => votes.for_votes += weight,
            VoteType::Abstain => votes.abstain += weight,
        }

        Ok(weight)
    }

    fn queue(&mut self, world: &mut World, env: &Env, args: &[AbiValue]) -> anyhow::Result<U256> {
        let call = ProposalCall::decode(args)?;
        let description_hash = args[3].as_fixed_bytes()?;
        let id = call.id(description_hash);

        if self.state(world, env, id)? != ProposalState::Succeeded {
            return Err(revert("Governor: proposal not successful"));
        }

        let delay = self
            .timelock_view_no_args(world, env, "getMinDelay() returns (uint256)")?
            .as_uint()?;
        let salt = timelock_salt(env.this, description_hash);

        let queue_id = world
            .call_fn_one(
                env.this,
                self.timelock,
                "hashOperationBatch(address[],uint256[],bytes[],bytes32,bytes32) returns (bytes32)",
                &call.batch_args(salt),
            )?
            .as_fixed_bytes()?;
        self.timelock_ids.insert(id, queue_id);

        let mut schedule_args = call.batch_args(salt);
        schedule_args.push(delay.into());
        world.call_fn(
            env.this,
            self.timelock,
            "scheduleBatch(address[],uint256[],bytes[],bytes32,bytes32,uint256)",
            &schedule_args,
        )?;

        Ok(id)
    }

    fn timelock_view_no_args(&self, world: &mut World, env: &Env, function: &str) -> anyhow::Result<AbiValue> {
        world.call_fn_one(env.this, self.timelock, function, &[])
    }

    fn execute(&mut self, world: &mut World, env: &Env, args: &[AbiValue]) -> anyhow::Result<U256> {
        let call = ProposalCall::decode(args)?;
        let description_hash = args[3].as_fixed_bytes()?;
        let id = call.id(description_hash);

        let state = self.state(world, env, id)?;
        if state != ProposalState::Succeeded && state != ProposalState::Queued {
            return Err(revert("Governor: proposal not successful"));
        }

        if let Some(proposal) = self.proposals.get_mut(&id) {
            proposal.executed = true;
        }

        let salt = timelock_salt(env.this, description_hash);
        world.call_fn(
            env.this,
            self.timelock,
            "executeBatch(address[],uint256[],bytes[],bytes32,bytes32)",
            &call.batch_args(salt),
        )?;

        Ok(id)
    }

    pub fn handle(
        &mut self,
        world: &mut World,
        env: &Env,
        function: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Vec<AbiValue>> {
        let outputs = match function {
            "name" => vec!["GovernorContract".into()],
            "token" => vec![self.token.into()],
            "timelock" => vec![self.timelock.into()],
            "votingDelay" => vec![AbiValue::uint(self.voting_delay)],
            "votingPeriod" => vec![AbiValue::uint(self.voting_period)],
            "proposalThreshold" => vec![AbiValue::uint(0)],
            "quorumNumerator" => vec![self.quorum_numerator.into()],
            "quorum" => vec![self.quorum(world, env, args[0].as_u64()?)?.into()],
            "hashProposal" => {
                let call = ProposalCall::decode(args)?;
                vec![call.id(args[3].as_fixed_bytes()?).into()]
            }
            "state" => {
                let state = self.state(world, env, args[0].as_uint()?)?;
                vec![AbiValue::uint(state as u64)]
            }
            "proposalSnapshot" => vec![AbiValue::uint(self.proposal(args[0].as_uint()?)?.snapshot)],
            "proposalDeadline" => vec![AbiValue::uint(self.proposal(args[0].as_uint()?)?.deadline)],
            "proposalEta" => {
                let eta = match self.timelock_ids.get(&args[0].as_uint()?) {
                    Some(&queue_id) => {
                        let ts = self
                            .timelock_view(world, env, "getTimestamp(bytes32) returns (uint256)", queue_id)?
                            .as_uint()?;
                        // executed operations report the done marker, not an eta
                        if ts == U256::from(1) { U256::ZERO } else { ts }
                    }
                    None => U256::ZERO,
                };
                vec![eta.into()]
            }
            "proposalVotes" => {
                let votes = self.votes.get(&args[0].as_uint()?).cloned().unwrap_or_default();
                vec![votes.against.into(), votes.for_votes.into(), votes.abstain.into()]
            }
            "hasVoted" => {
                let account = args[1].as_address()?;
                let voted = self
                    .votes
                    .get(&args[0].as_uint()?)
                    .is_some_and(|v| v.voters.contains(&account));
                vec![voted.into()]
            }
            "getVotes" => {
                vec![self.past_votes(world, env, args[0].as_address()?, args[1].as_u64()?)?.into()]
            }
            "propose" => vec![self.propose(env, args)?.into()],
            "castVote" | "castVoteWithReason" => {
                let weight = self.cast_vote(world, env, args[0].as_uint()?, args[1].as_u64()?)?;
                if function == "castVoteWithReason" {
                    tracing::debug!(voter = %env.sender, reason = %args[2].as_str()?, "Simulated vote cast");
                }
                vec![weight.into()]
            }
            "queue" => vec![self.queue(world, env, args)?.into()],
            "execute" => vec![self.execute(world, env, args)?.into()],
            other => return Err(unhandled("GovernorContract", other)),
        };
        Ok(outputs)
    }
}
