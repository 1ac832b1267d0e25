//! Deployment plan: named steps ordered by their requirements.
//!
//! A plan is validated and resolved when it is built, so a cyclic or dangling
//! requirement graph is rejected before anything touches the chain.

use std::{collections::BTreeSet, fmt, sync::Arc, time::SystemTime};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::Serialize;
use strum::Display;

use crate::{
    abi::AbiValue,
    chain::ChainClient,
    config::Network,
    context::PipelineContext,
    errors::PlanError,
    registry::{DeploymentRegistry, DeploymentResult},
};

/// Where a constructor argument comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSource {
    Value(AbiValue),
    /// The account running the pipeline.
    Deployer,
    /// Address recorded for another step on the same network.
    AddressOf(String),
}

type Predicate = Arc<dyn Fn(&Network) -> bool + Send + Sync>;

/// A named deployment with its requirements and constructor arguments.
#[derive(Clone)]
pub struct DeploymentStep {
    name: String,
    contract: String,
    requires: Vec<String>,
    args: Vec<ArgSource>,
    predicate: Predicate,
}

impl fmt::Debug for DeploymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentStep")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .field("requires", &self.requires)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl DeploymentStep {
    /// A step deploying the artifact of the same name, on every network.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            contract: name.clone(),
            name,
            requires: Vec::new(),
            args: Vec::new(),
            predicate: Arc::new(|_| true),
        }
    }

    /// Deploy a differently named artifact.
    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = contract.into();
        self
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.requires.contains(&name) {
                self.requires.push(name);
            }
        }
        self
    }

    pub fn arg(mut self, value: impl Into<AbiValue>) -> Self {
        self.args.push(ArgSource::Value(value.into()));
        self
    }

    pub fn arg_deployer(mut self) -> Self {
        self.args.push(ArgSource::Deployer);
        self
    }

    /// Pass the address of another step. The step becomes a requirement.
    pub fn arg_address_of(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut step = self.requires([name.clone()]);
        step.args.push(ArgSource::AddressOf(name));
        step
    }

    /// Only run the step on networks matching `predicate`.
    pub fn when(mut self, predicate: impl Fn(&Network) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Only run the step on simulated networks.
    pub fn simulated_only(self) -> Self {
        self.when(|network| network.simulated)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract_name(&self) -> &str {
        &self.contract
    }

    pub fn requirements(&self) -> &[String] {
        &self.requires
    }

    pub fn applies_to(&self, network: &Network) -> bool {
        (self.predicate)(network)
    }
}

/// Which steps may overwrite an existing registry entry.
///
/// The selection does not cascade: a step that requires a redeployed step keeps
/// its recorded deployment unless it is selected too, and is then listed in
/// [`PlanReport::stale`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Redeploy {
    #[default]
    None,
    All,
    Only(BTreeSet<String>),
}

impl Redeploy {
    pub fn applies(&self, step: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(steps) => steps.contains(step),
        }
    }
}

/// What happened to a step during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum StepStatus {
    Deployed,
    /// A confirmed deployment was already recorded.
    Reused,
    /// The step does not apply to this network.
    Skipped,
}

/// Progress record for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub contract: String,
    pub status: StepStatus,
    pub address: Option<Address>,
    pub confirmations: u64,
    pub gas_used: u64,
    pub tx_hash: Option<B256>,
}

/// Outcome of a plan run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub steps: Vec<StepReport>,
    /// Reused steps whose recorded constructor arguments no longer match.
    pub stale: Vec<String>,
}

impl PlanReport {
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.step(name).map(|s| s.status)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// A validated set of deployment steps with its execution order.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    steps: Vec<DeploymentStep>,
    order: Vec<usize>,
}

impl DeploymentPlan {
    /// Validate `steps` and resolve their execution order.
    ///
    /// Every step comes after its requirements; among steps that are ready at the
    /// same time, the one declared first goes first.
    pub fn new(steps: Vec<DeploymentStep>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep(step.name.clone()).into());
            }
        }

        let index_of = |name: &str| steps.iter().position(|s| s.name == name);

        let mut edges = Vec::with_capacity(steps.len());
        for step in &steps {
            let deps = step
                .requires
                .iter()
                .map(|dep| {
                    index_of(dep).ok_or_else(|| PlanError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            edges.push(deps);
        }

        let mut placed = vec![false; steps.len()];
        let mut order = Vec::with_capacity(steps.len());

        while order.len() < steps.len() {
            let next = (0..steps.len())
                .find(|&i| !placed[i] && edges[i].iter().all(|&dep| placed[dep]));

            match next {
                Some(i) => {
                    placed[i] = true;
                    order.push(i);
                }
                None => {
                    let cycle = find_cycle(&edges, &placed)
                        .into_iter()
                        .map(|i| steps[i].name.clone())
                        .collect();
                    return Err(PlanError::CyclicDependency { cycle }.into());
                }
            }
        }

        Ok(Self { steps, order })
    }

    /// Step names in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.steps[i].name.as_str()).collect()
    }

    pub fn steps(&self) -> impl Iterator<Item = &DeploymentStep> {
        self.order.iter().map(|&i| &self.steps[i])
    }

    /// Execute the plan against the context's network.
    ///
    /// Each result is recorded in the registry once the deployment is confirmed,
    /// before any later step starts. On error the registry holds exactly the
    /// steps that completed.
    pub async fn run<C, R>(
        &self,
        ctx: &mut PipelineContext<'_, C, R>,
        redeploy: &Redeploy,
    ) -> Result<PlanReport>
    where
        C: ChainClient,
        R: DeploymentRegistry,
    {
        let chain_id = ctx.chain_id();
        let mut report = PlanReport::default();

        tracing::info!(
            network = %ctx.network.name,
            steps = self.order.len(),
            order = ?self.order(),
            "Running deployment plan"
        );

        for step in self.steps() {
            if !step.applies_to(ctx.network) {
                tracing::info!(step = %step.name, network = %ctx.network.name, "Step does not apply to this network, skipping");
                report.steps.push(StepReport {
                    name: step.name.clone(),
                    contract: step.contract.clone(),
                    status: StepStatus::Skipped,
                    address: None,
                    confirmations: 0,
                    gas_used: 0,
                    tx_hash: None,
                });
                continue;
            }

            for dep in &step.requires {
                ctx.registry
                    .require(chain_id, dep)
                    .with_context(|| format!("Step `{}` cannot run", step.name))?;
            }

            let args = step
                .args
                .iter()
                .map(|source| match source {
                    ArgSource::Value(value) => Ok(value.clone()),
                    ArgSource::Deployer => Ok(AbiValue::Address(ctx.deployer)),
                    ArgSource::AddressOf(name) => {
                        Ok(AbiValue::Address(ctx.registry.address_of(chain_id, name)?))
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            if let Some(existing) = ctx.registry.get(chain_id, &step.name)
                && existing.confirmed
                && !redeploy.applies(&step.name)
            {
                if existing.constructor_args != args {
                    let replaced = step
                        .requires
                        .iter()
                        .filter(|dep| report.status_of(dep) == Some(StepStatus::Deployed))
                        .collect::<Vec<_>>();
                    tracing::warn!(
                        step = %step.name,
                        replaced_requirements = ?replaced,
                        "Recorded deployment was made with different constructor arguments; redeploy `{}` as well to replace it",
                        step.name
                    );
                    report.stale.push(step.name.clone());
                }
                tracing::info!(step = %step.name, address = %existing.address, "Already deployed, reusing");
                report.steps.push(StepReport {
                    name: step.name.clone(),
                    contract: step.contract.clone(),
                    status: StepStatus::Reused,
                    address: Some(existing.address),
                    confirmations: existing.confirmations,
                    gas_used: 0,
                    tx_hash: existing.tx_hash,
                });
                continue;
            }

            tracing::info!(step = %step.name, contract = %step.contract, "Deploying...");

            let deployed = ctx
                .client
                .deploy(&step.contract, &args, ctx.network.confirmations)
                .await
                .with_context(|| format!("Failed to deploy `{}`", step.name))?;

            let result = DeploymentResult {
                contract_name: step.contract.clone(),
                address: deployed.address,
                constructor_args: args,
                confirmed: true,
                tx_hash: Some(deployed.receipt.tx_hash),
                block_number: deployed.receipt.block_number,
                confirmations: deployed.receipt.confirmations,
                gas_used: deployed.receipt.gas_used,
                deployed_at: unix_now(),
            };
            ctx.registry
                .put(chain_id, &step.name, result)
                .with_context(|| format!("Failed to record deployment of `{}`", step.name))?;

            tracing::info!(
                step = %step.name,
                address = %deployed.address,
                confirmations = deployed.receipt.confirmations,
                block = deployed.receipt.block_number,
                "Deployed"
            );

            report.steps.push(StepReport {
                name: step.name.clone(),
                contract: step.contract.clone(),
                status: StepStatus::Deployed,
                address: Some(deployed.address),
                confirmations: deployed.receipt.confirmations,
                gas_used: deployed.receipt.gas_used,
                tx_hash: Some(deployed.receipt.tx_hash),
            });
        }

        Ok(report)
    }
}

/// Follow unplaced requirements from the first unplaced step until a step repeats.
///
/// Every unplaced step has at least one unplaced requirement, otherwise the
/// resolver would have placed it.
fn find_cycle(edges: &[Vec<usize>], placed: &[bool]) -> Vec<usize> {
    let Some(mut current) = placed.iter().position(|p| !p) else {
        return Vec::new();
    };

    let mut path = Vec::new();
    while !path.contains(&current) {
        path.push(current);
        match edges[current].iter().copied().find(|&dep| !placed[dep]) {
            Some(next) => current = next,
            None => return path,
        }
    }

    let start = path.iter().position(|&i| i == current).unwrap_or_default();
    let mut cycle = path.split_off(start);
    cycle.push(current);
    cycle
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
