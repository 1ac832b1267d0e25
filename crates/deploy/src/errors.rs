//! Error types raised by the pipeline.
//!
//! Functions return [`anyhow::Result`]; these typed errors are raised into it so
//! that callers can classify failures with `downcast_ref`.

use alloy_core::primitives::U256;
use thiserror::Error;

use crate::governance::ProposalState;

/// Errors detected while building or running a deployment plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The requirement graph contains a cycle.
    #[error("Cyclic dependency between deployment steps: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A step requires a name that no step declares.
    #[error("Deployment step `{step}` requires unknown step `{dependency}`")]
    UnknownDependency { step: String, dependency: String },

    /// Two steps share a name.
    #[error("Deployment step `{0}` is declared more than once")]
    DuplicateStep(String),

    /// A dependency has no recorded deployment on this network.
    #[error("No deployment of `{name}` recorded on chain {chain_id}")]
    MissingDeployment { chain_id: u64, name: String },
}

/// Errors raised by the wiring executor.
#[derive(Debug, Error)]
pub enum WiringError {
    /// A wiring action was rejected; the remaining actions were not attempted.
    #[error("Wiring action failed: {action}")]
    WiringFailed {
        action: String,
        #[source]
        cause: anyhow::Error,
    },
}

/// Errors raised by the governance proposal driver.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// The proposal content (description included) hashes to a different id.
    #[error("Description hash mismatch: proposal {expected} but the provided content hashes to {computed}")]
    DescriptionHashMismatch { expected: U256, computed: U256 },

    /// The timelock rejected execution because the delay has not elapsed.
    #[error("Premature execution rejected by the timelock: {reason}")]
    PrematureExecution { reason: String },

    /// The proposal is not in the state the operation requires.
    #[error("Proposal {proposal} is {actual}, expected {expected}")]
    InsufficientVotingState {
        proposal: U256,
        expected: ProposalState,
        actual: ProposalState,
    },

    /// Block or time advancement was requested on a live network.
    #[error("Cannot {operation} on live network `{network}`")]
    NotSimulated {
        operation: &'static str,
        network: String,
    },
}

/// Errors surfaced by a chain client.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The transaction or call reverted. The reason is the node's message, verbatim.
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    /// The JSON-RPC endpoint returned an error that is not a revert.
    #[error("RPC error from {method}: {message}")]
    Rpc { method: String, message: String },

    /// No artifact or contract model exists for this name.
    #[error("Unknown contract `{0}`")]
    UnknownContract(String),
}

impl ChainError {
    /// The revert reason, if this error is a revert.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason } => Some(reason),
            _ => None,
        }
    }
}
