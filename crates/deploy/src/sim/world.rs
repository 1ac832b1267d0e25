use std::collections::HashMap;

use alloy_core::primitives::Address;

use super::{contracts::SimContract, revert};
use crate::abi::{AbiValue, decode_output, encode_call};

/// Execution environment of a single call frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Env {
    /// `msg.sender`
    pub sender: Address,
    /// `address(this)`
    pub this: Address,
    pub block: u64,
    pub timestamp: u64,
}

/// Ledger state of the simulated chain.
#[derive(Debug, Clone)]
pub(crate) struct World {
    block_number: u64,
    timestamp: u64,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, SimContract>,
    /// Contracts with a frame on the call stack.
    executing: Vec<Address>,
}

impl World {
    pub fn new(genesis_timestamp: u64) -> Self {
        Self {
            block_number: 0,
            timestamp: genesis_timestamp,
            nonces: HashMap::new(),
            contracts: HashMap::new(),
            executing: Vec::new(),
        }
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn mine(&mut self) {
        self.block_number += 1;
        self.timestamp += 1;
    }

    pub fn increase_time(&mut self, seconds: u64) {
        self.timestamp += seconds;
    }

    /// Increment the account nonce, returning the value before the increment.
    pub fn bump_nonce(&mut self, account: Address) -> u64 {
        let nonce = self.nonces.entry(account).or_default();
        let current = *nonce;
        *nonce += 1;
        current
    }

    fn env(&self, sender: Address, this: Address) -> Env {
        Env {
            sender,
            this,
            block: self.block_number,
            timestamp: self.timestamp,
        }
    }

    /// Create `contract` from `deployer`. The address follows the CREATE rule
    /// using the nonce of the deployment transaction.
    pub fn deploy(
        &mut self,
        deployer: Address,
        contract: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Address> {
        let nonce = self.nonces.get(&deployer).copied().unwrap_or_default().saturating_sub(1);
        let address = deployer.create(nonce);

        let env = self.env(deployer, address);
        let model = SimContract::construct(contract, &env, args)?;
        self.contracts.insert(address, model);

        Ok(address)
    }

    /// Execute raw calldata against `to` with `caller` as `msg.sender`.
    pub fn call(&mut self, caller: Address, to: Address, calldata: &[u8]) -> anyhow::Result<Vec<u8>> {
        if self.executing.contains(&to) {
            return Err(revert(format!(
                "reentrant call into {} is not supported by the simulated chain",
                to
            )));
        }

        let mut contract = self
            .contracts
            .remove(&to)
            .ok_or_else(|| revert(format!("call to non-contract account {}", to)))?;

        let env = self.env(caller, to);
        self.executing.push(to);
        let result = contract.execute(self, &env, calldata);
        self.executing.pop();
        self.contracts.insert(to, contract);

        result
    }

    /// Call `signature` on another contract from within a frame.
    pub fn call_fn(
        &mut self,
        caller: Address,
        to: Address,
        signature: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Vec<AbiValue>> {
        let calldata = encode_call(signature, args)?;
        let output = self.call(caller, to, &calldata)?;
        decode_output(signature, &output)
    }

    /// Like [`World::call_fn`] for functions with a single return value.
    pub fn call_fn_one(
        &mut self,
        caller: Address,
        to: Address,
        signature: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<AbiValue> {
        self.call_fn(caller, to, signature, args)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("`{}` returned no value", signature))
    }
}
