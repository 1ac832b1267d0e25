use std::collections::HashMap;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256, keccak256},
};

use super::{
    access::AccessControl,
    contracts::unhandled,
    revert,
    world::{Env, World},
};
use crate::abi::{AbiValue, role_id};

/// Timestamp marking an executed operation.
const DONE_TIMESTAMP: u64 = 1;

struct Batch {
    targets: Vec<Address>,
    values: Vec<U256>,
    payloads: Vec<Bytes>,
    predecessor: B256,
    salt: B256,
}

impl Batch {
    fn decode(args: &[AbiValue]) -> anyhow::Result<Self> {
        let targets = args[0]
            .as_array()?
            .iter()
            .map(AbiValue::as_address)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let values = args[1]
            .as_array()?
            .iter()
            .map(AbiValue::as_uint)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let payloads = args[2]
            .as_array()?
            .iter()
            .map(|p| p.as_bytes().cloned())
            .collect::<anyhow::Result<Vec<_>>>()?;

        if targets.len() != values.len() || targets.len() != payloads.len() {
            return Err(revert("TimelockController: length mismatch"));
        }

        Ok(Self {
            targets,
            values,
            payloads,
            predecessor: args[3].as_fixed_bytes()?,
            salt: args[4].as_fixed_bytes()?,
        })
    }

    /// `keccak256(abi.encode(targets, values, payloads, predecessor, salt))`
    fn id(&self) -> B256 {
        let encoded = DynSolValue::Tuple(vec![
            DynSolValue::Array(self.targets.iter().copied().map(DynSolValue::Address).collect()),
            DynSolValue::Array(self.values.iter().map(|v| DynSolValue::Uint(*v, 256)).collect()),
            DynSolValue::Array(
                self.payloads
                    .iter()
                    .map(|p| DynSolValue::Bytes(p.to_vec()))
                    .collect(),
            ),
            DynSolValue::FixedBytes(self.predecessor, 32),
            DynSolValue::FixedBytes(self.salt, 32),
        ])
        .abi_encode_params();
        keccak256(encoded)
    }
}

/// `TimeLock(minDelay, proposers, executors, admin)`: a timelock controller.
///
/// Operations are scheduled by proposers and become executable once `minDelay`
/// seconds have passed. Granting the executor role to the zero address opens
/// execution to everyone.
#[derive(Debug, Clone)]
pub(crate) struct TimeLock {
    access: AccessControl,
    min_delay: u64,
    timestamps: HashMap<B256, u64>,
}

impl TimeLock {
    pub const CONSTRUCTOR: &'static str = "TimeLock(uint256,address[],address[],address)";

    pub const SIGNATURES: &'static [&'static str] = &[
        "hasRole(bytes32,address) returns (bool)",
        "getRoleAdmin(bytes32) returns (bytes32)",
        "grantRole(bytes32,address)",
        "revokeRole(bytes32,address)",
        "renounceRole(bytes32,address)",
        "TIMELOCK_ADMIN_ROLE() returns (bytes32)",
        "PROPOSER_ROLE() returns (bytes32)",
        "EXECUTOR_ROLE() returns (bytes32)",
        "CANCELLER_ROLE() returns (bytes32)",
        "getMinDelay() returns (uint256)",
        "getTimestamp(bytes32) returns (uint256)",
        "isOperation(bytes32) returns (bool)",
        "isOperationPending(bytes32) returns (bool)",
        "isOperationReady(bytes32) returns (bool)",
        "isOperationDone(bytes32) returns (bool)",
        "hashOperationBatch(address[],uint256[],bytes[],bytes32,bytes32) returns (bytes32)",
        "scheduleBatch(address[],uint256[],bytes[],bytes32,bytes32,uint256)",
        "executeBatch(address[],uint256[],bytes[],bytes32,bytes32)",
        "cancel(bytes32)",
    ];

    pub fn new(env: &Env, args: &[AbiValue]) -> anyhow::Result<Self> {
        let admin_role = role_id("TIMELOCK_ADMIN_ROLE");
        let proposer_role = role_id("PROPOSER_ROLE");
        let executor_role = role_id("EXECUTOR_ROLE");
        let canceller_role = role_id("CANCELLER_ROLE");

        let mut access = AccessControl::default();
        for role in [admin_role, proposer_role, executor_role, canceller_role] {
            access.set_role_admin(role, admin_role);
        }

        access.grant(admin_role, env.this);
        let admin = args[3].as_address()?;
        if !admin.is_zero() {
            access.grant(admin_role, admin);
        }
        for proposer in args[1].as_array()? {
            let proposer = proposer.as_address()?;
            access.grant(proposer_role, proposer);
            access.grant(canceller_role, proposer);
        }
        for executor in args[2].as_array()? {
            access.grant(executor_role, executor.as_address()?);
        }

        Ok(Self {
            access,
            min_delay: args[0].as_u64()?,
            timestamps: HashMap::new(),
        })
    }

    fn timestamp(&self, id: B256) -> u64 {
        self.timestamps.get(&id).copied().unwrap_or_default()
    }

    fn is_pending(&self, id: B256) -> bool {
        self.timestamp(id) > DONE_TIMESTAMP
    }

    fn is_ready(&self, id: B256, now: u64) -> bool {
        let ts = self.timestamp(id);
        ts > DONE_TIMESTAMP && ts <= now
    }

    fn is_done(&self, id: B256) -> bool {
        self.timestamp(id) == DONE_TIMESTAMP
    }

    pub fn handle(
        &mut self,
        world: &mut World,
        env: &Env,
        function: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Vec<AbiValue>> {
        if let Some(outputs) = self.access.handle(env, function, args)? {
            return Ok(outputs);
        }

        let outputs = match function {
            "TIMELOCK_ADMIN_ROLE" | "PROPOSER_ROLE" | "EXECUTOR_ROLE" | "CANCELLER_ROLE" => {
                vec![role_id(function).into()]
            }
            "getMinDelay" => vec![AbiValue::uint(self.min_delay)],
            "getTimestamp" => vec![AbiValue::uint(self.timestamp(args[0].as_fixed_bytes()?))],
            "isOperation" => vec![(self.timestamp(args[0].as_fixed_bytes()?) > 0).into()],
            "isOperationPending" => vec![self.is_pending(args[0].as_fixed_bytes()?).into()],
            "isOperationReady" => {
                vec![self.is_ready(args[0].as_fixed_bytes()?, env.timestamp).into()]
            }
            "isOperationDone" => vec![self.is_done(args[0].as_fixed_bytes()?).into()],
            "hashOperationBatch" => vec![Batch::decode(args)?.id().into()],
            "scheduleBatch" => {
                self.access.check_role(role_id("PROPOSER_ROLE"), env.sender)?;
                let batch = Batch::decode(args)?;
                let delay = args[5].as_u64()?;
                let id = batch.id();

                if self.timestamp(id) > 0 {
                    return Err(revert("TimelockController: operation already scheduled"));
                }
                if delay < self.min_delay {
                    return Err(revert("TimelockController: insufficient delay"));
                }
                self.timestamps.insert(id, env.timestamp + delay);
                vec![]
            }
            "executeBatch" => {
                let executor_role = role_id("EXECUTOR_ROLE");
                if !self.access.has_role(executor_role, Address::ZERO) {
                    self.access.check_role(executor_role, env.sender)?;
                }

                let batch = Batch::decode(args)?;
                let id = batch.id();
                if !self.is_ready(id, env.timestamp) {
                    return Err(revert("TimelockController: operation is not ready"));
                }
                if !batch.predecessor.is_zero() && !self.is_done(batch.predecessor) {
                    return Err(revert("TimelockController: missing dependency"));
                }

                for (target, payload) in batch.targets.iter().zip(&batch.payloads) {
                    if let Err(e) = world.call(env.this, *target, payload) {
                        tracing::debug!(target = %target, err = %e, "Timelock call reverted");
                        return Err(revert("TimelockController: underlying transaction reverted"));
                    }
                }

                self.timestamps.insert(id, DONE_TIMESTAMP);
                vec![]
            }
            "cancel" => {
                self.access.check_role(role_id("CANCELLER_ROLE"), env.sender)?;
                let id = args[0].as_fixed_bytes()?;
                if !self.is_pending(id) {
                    return Err(revert(
                        "TimelockController: operation cannot be cancelled",
                    ));
                }
                self.timestamps.remove(&id);
                vec![]
            }
            other => return Err(unhandled("TimeLock", other)),
        };
        Ok(outputs)
    }
}
