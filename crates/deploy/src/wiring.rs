//! Post-deployment wiring.
//!
//! Each action is guarded by a read of the current on-chain configuration and
//! only applied when the guard reports it missing, so a wiring sequence can be
//! re-run after a partial failure.

use alloy_core::primitives::{Address, U256};
use anyhow::Result;
use serde::Serialize;
use strum::Display;

use crate::{
    abi::AbiValue,
    chain::{ChainClient, call_one},
    context::PipelineContext,
    errors::WiringError,
    registry::DeploymentRegistry,
};

/// An account referenced by a wiring action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Deployer,
    /// The zero address, e.g. to open a role to everyone.
    Zero,
    /// A contract recorded in the registry.
    Contract(String),
}

/// The configuration change an action makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringKind {
    /// Grant an access-control role. The role id is read from the contract's
    /// `<ROLE>()` getter.
    GrantRole {
        contract: String,
        role: String,
        account: AccountRef,
    },
    RevokeRole {
        contract: String,
        role: String,
        account: AccountRef,
    },
    TransferOwnership {
        contract: String,
        new_owner: AccountRef,
    },
    /// Call a single-use initializer. `probe` is an address getter that reads
    /// non-zero once the initializer has run.
    Initialize {
        contract: String,
        signature: String,
        args: Vec<AccountRef>,
        probe: String,
    },
    /// Delegate the deployer's voting power.
    Delegate {
        token: String,
        delegatee: AccountRef,
    },
}

impl WiringKind {
    /// Registry names the action reads.
    fn referenced_contracts(&self) -> Vec<&str> {
        let mut names = match self {
            Self::GrantRole { contract, account, .. } | Self::RevokeRole { contract, account, .. } => {
                std::iter::once(contract.as_str()).chain(contract_of(account)).collect::<Vec<_>>()
            }
            Self::TransferOwnership { contract, new_owner } => {
                std::iter::once(contract.as_str()).chain(contract_of(new_owner)).collect()
            }
            Self::Initialize { contract, args, .. } => std::iter::once(contract.as_str())
                .chain(args.iter().filter_map(contract_of))
                .collect(),
            Self::Delegate { token, delegatee } => {
                std::iter::once(token.as_str()).chain(contract_of(delegatee)).collect()
            }
        };
        names.dedup();
        names
    }
}

fn contract_of(account: &AccountRef) -> Option<&str> {
    match account {
        AccountRef::Contract(name) => Some(name.as_str()),
        _ => None,
    }
}

/// A described, guarded configuration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringAction {
    pub description: String,
    pub kind: WiringKind,
}

impl WiringAction {
    pub fn new(description: impl Into<String>, kind: WiringKind) -> Self {
        Self {
            description: description.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum WiringStatus {
    Applied,
    /// The guard found the configuration already in place.
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringOutcome {
    pub description: String,
    pub status: WiringStatus,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WiringReport {
    pub actions: Vec<WiringOutcome>,
}

impl WiringReport {
    pub fn status_of(&self, description: &str) -> Option<WiringStatus> {
        self.actions
            .iter()
            .find(|a| a.description == description)
            .map(|a| a.status)
    }

    pub fn applied(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == WiringStatus::Applied)
            .count()
    }
}

/// Actions executed in declaration order.
#[derive(Debug, Clone, Default)]
pub struct WiringPlan {
    actions: Vec<WiringAction>,
}

impl WiringPlan {
    pub fn new(actions: Vec<WiringAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[WiringAction] {
        &self.actions
    }

    /// Run every action whose guard reports it missing.
    ///
    /// All referenced contracts must be recorded before the first action runs.
    /// The first failing action aborts the sequence with
    /// [`WiringError::WiringFailed`]; nothing is rolled back.
    pub async fn run<C, R>(&self, ctx: &PipelineContext<'_, C, R>) -> Result<WiringReport>
    where
        C: ChainClient,
        R: DeploymentRegistry,
    {
        for action in &self.actions {
            for name in action.kind.referenced_contracts() {
                ctx.registry.require(ctx.chain_id(), name)?;
            }
        }

        let mut report = WiringReport::default();

        for action in &self.actions {
            let executor = Executor { ctx };

            let already_applied = executor
                .guard(&action.kind)
                .await
                .map_err(|cause| WiringError::WiringFailed {
                    action: action.description.clone(),
                    cause,
                })?;

            if already_applied {
                tracing::info!(action = %action.description, "Already wired, skipping");
                report.actions.push(WiringOutcome {
                    description: action.description.clone(),
                    status: WiringStatus::AlreadyApplied,
                    gas_used: 0,
                });
                continue;
            }

            tracing::info!(action = %action.description, "Wiring...");

            let gas_used = executor
                .apply(&action.kind)
                .await
                .map_err(|cause| WiringError::WiringFailed {
                    action: action.description.clone(),
                    cause,
                })?;

            tracing::info!(action = %action.description, gas_used, "Wired");

            report.actions.push(WiringOutcome {
                description: action.description.clone(),
                status: WiringStatus::Applied,
                gas_used,
            });
        }

        Ok(report)
    }
}

struct Executor<'c, 'a, C, R> {
    ctx: &'c PipelineContext<'a, C, R>,
}

impl<C: ChainClient, R: DeploymentRegistry> Executor<'_, '_, C, R> {
    fn resolve(&self, account: &AccountRef) -> Result<Address> {
        match account {
            AccountRef::Deployer => Ok(self.ctx.deployer),
            AccountRef::Zero => Ok(Address::ZERO),
            AccountRef::Contract(name) => self.ctx.address_of(name),
        }
    }

    async fn role_id(&self, contract: Address, role: &str) -> Result<AbiValue> {
        let signature = format!("{}() returns (bytes32)", role);
        call_one(self.ctx.client, contract, &signature, &[]).await
    }

    async fn has_role(&self, contract: &str, role: &str, account: &AccountRef) -> Result<bool> {
        let contract = self.ctx.address_of(contract)?;
        let role = self.role_id(contract, role).await?;
        let account = self.resolve(account)?;

        call_one(
            self.ctx.client,
            contract,
            "hasRole(bytes32,address) returns (bool)",
            &[role, account.into()],
        )
        .await?
        .as_bool()
    }

    /// Whether the change is already in place.
    async fn guard(&self, kind: &WiringKind) -> Result<bool> {
        match kind {
            WiringKind::GrantRole { contract, role, account } => {
                self.has_role(contract, role, account).await
            }
            WiringKind::RevokeRole { contract, role, account } => {
                Ok(!self.has_role(contract, role, account).await?)
            }
            WiringKind::TransferOwnership { contract, new_owner } => {
                let address = self.ctx.address_of(contract)?;
                let owner = call_one(self.ctx.client, address, "owner() returns (address)", &[])
                    .await?
                    .as_address()?;
                Ok(owner == self.resolve(new_owner)?)
            }
            WiringKind::Initialize { contract, probe, .. } => {
                let address = self.ctx.address_of(contract)?;
                let current = call_one(self.ctx.client, address, probe, &[])
                    .await?
                    .as_address()?;
                Ok(!current.is_zero())
            }
            WiringKind::Delegate { token, delegatee } => {
                let address = self.ctx.address_of(token)?;
                let current = call_one(
                    self.ctx.client,
                    address,
                    "delegates(address) returns (address)",
                    &[self.ctx.deployer.into()],
                )
                .await?
                .as_address()?;
                Ok(current == self.resolve(delegatee)?)
            }
        }
    }

    /// Apply the change, returning the gas used.
    async fn apply(&self, kind: &WiringKind) -> Result<u64> {
        let (target, signature, args) = match kind {
            WiringKind::GrantRole { contract, role, account }
            | WiringKind::RevokeRole { contract, role, account } => {
                let address = self.ctx.address_of(contract)?;
                let role = self.role_id(address, role).await?;
                let signature = if matches!(kind, WiringKind::GrantRole { .. }) {
                    "grantRole(bytes32,address)"
                } else {
                    "revokeRole(bytes32,address)"
                };
                (address, signature.to_string(), vec![role, self.resolve(account)?.into()])
            }
            WiringKind::TransferOwnership { contract, new_owner } => (
                self.ctx.address_of(contract)?,
                "transferOwnership(address)".to_string(),
                vec![self.resolve(new_owner)?.into()],
            ),
            WiringKind::Initialize { contract, signature, args, .. } => (
                self.ctx.address_of(contract)?,
                signature.clone(),
                args.iter()
                    .map(|a| self.resolve(a).map(AbiValue::from))
                    .collect::<Result<Vec<_>>>()?,
            ),
            WiringKind::Delegate { token, delegatee } => (
                self.ctx.address_of(token)?,
                "delegate(address)".to_string(),
                vec![self.resolve(delegatee)?.into()],
            ),
        };

        let receipt = self
            .ctx
            .client
            .send(target, &signature, &args, U256::ZERO, self.ctx.network.confirmations)
            .await?;

        Ok(receipt.gas_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_contracts() {
        let grant = WiringKind::GrantRole {
            contract: "TimeLock".to_string(),
            role: "PROPOSER_ROLE".to_string(),
            account: AccountRef::Contract("GovernorContract".to_string()),
        };
        assert_eq!(grant.referenced_contracts(), vec!["TimeLock", "GovernorContract"]);

        let open = WiringKind::GrantRole {
            contract: "TimeLock".to_string(),
            role: "EXECUTOR_ROLE".to_string(),
            account: AccountRef::Zero,
        };
        assert_eq!(open.referenced_contracts(), vec!["TimeLock"]);

        let init = WiringKind::Initialize {
            contract: "GovernanceToken".to_string(),
            signature: "initialize(address)".to_string(),
            args: vec![AccountRef::Contract("DeFiExchange".to_string())],
            probe: "s_stakingContractAddress() returns (address)".to_string(),
        };
        assert_eq!(init.referenced_contracts(), vec!["GovernanceToken", "DeFiExchange"]);
    }
}
