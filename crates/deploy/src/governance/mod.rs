//! Governance proposal lifecycle: propose, vote, queue, execute.

mod driver;
mod ledger;

pub use driver::{DriverOptions, GOVERNOR_CONTRACT, GovernanceDriver, GovernorSettings, ProposalInfo};
pub use ledger::{FileProposalLedger, MemoryProposalLedger, ProposalLedger};

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, FromRepr};

use crate::abi::{self, AbiValue};

/// Proposal state, in the governor's numbering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ProposalState {
    Pending = 0,
    Active = 1,
    Canceled = 2,
    Defeated = 3,
    Succeeded = 4,
    Queued = 5,
    Expired = 6,
    Executed = 7,
}

impl ProposalState {
    /// Decode the value returned by the governor's `state(uint256)`.
    pub fn from_chain(value: u64) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .and_then(Self::from_repr)
            .ok_or_else(|| anyhow::anyhow!("Governor returned unknown proposal state {}", value))
    }
}

/// Ballot options accepted by `castVote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, FromRepr)]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum VoteType {
    Against = 0,
    For = 1,
    Abstain = 2,
}

/// One call the proposal makes once executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalAction {
    pub target: Address,
    pub value: U256,
    pub calldata: Bytes,
}

/// Proposal content. Its id is derived from the content, so the same request
/// must be presented again to queue and execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub actions: Vec<ProposalAction>,
    pub description: String,
}

impl ProposalRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            description: description.into(),
        }
    }

    /// Add a call to `target`, encoding `args` for `signature`.
    pub fn call(mut self, target: Address, signature: &str, args: &[AbiValue]) -> Result<Self> {
        self.actions.push(ProposalAction {
            target,
            value: U256::ZERO,
            calldata: abi::encode_call(signature, args)?,
        });
        Ok(self)
    }

    pub fn targets(&self) -> Vec<Address> {
        self.actions.iter().map(|a| a.target).collect()
    }

    pub fn values(&self) -> Vec<U256> {
        self.actions.iter().map(|a| a.value).collect()
    }

    pub fn calldatas(&self) -> Vec<Bytes> {
        self.actions.iter().map(|a| a.calldata.clone()).collect()
    }

    pub fn description_hash(&self) -> B256 {
        abi::description_hash(&self.description)
    }

    /// The id the governor assigns to this proposal.
    pub fn id(&self) -> U256 {
        abi::hash_proposal(
            &self.targets(),
            &self.values(),
            &self.calldatas(),
            self.description_hash(),
        )
    }

    /// `(targets, values, calldatas)` as call arguments.
    fn operation_args(&self) -> Vec<AbiValue> {
        vec![
            AbiValue::Array(self.targets().into_iter().map(AbiValue::from).collect()),
            AbiValue::Array(self.values().into_iter().map(AbiValue::from).collect()),
            AbiValue::Array(self.calldatas().into_iter().map(AbiValue::from).collect()),
        ]
    }
}
