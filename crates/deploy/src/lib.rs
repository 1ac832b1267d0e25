//! govsmith-deploy - Deployment and governance library for on-chain DAO stacks.
//!
//! This crate deploys a set of interdependent contracts in dependency order,
//! wires them together idempotently and drives governance proposals through
//! the propose, vote, queue and execute lifecycle.

pub mod abi;
pub mod chain;
pub mod config;
pub mod errors;
pub mod governance;
pub mod report;
pub mod standard;
pub mod workflows;

mod context;
pub use context::PipelineContext;

mod plan;
pub use plan::{
    ArgSource, DeploymentPlan, DeploymentStep, PlanReport, Redeploy, StepReport, StepStatus,
};

mod registry;
pub use registry::{DeploymentRegistry, DeploymentResult, FileRegistry, MemoryRegistry};

mod sim;
pub use sim::SimulatedChain;

mod wiring;
pub use wiring::{
    AccountRef, WiringAction, WiringKind, WiringOutcome, WiringPlan, WiringReport, WiringStatus,
};

pub use config::{Endpoint, HarnessConfig, Network};
pub use errors::{ChainError, GovernanceError, PlanError, WiringError};
