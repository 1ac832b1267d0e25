//! In-process simulated chain.
//!
//! Backs the `hardhat` network: an automining ledger that executes models of the
//! governance suite contracts. Every transaction is mined in its own block, a
//! reverted transaction leaves no trace, and blocks and time can be advanced at
//! will.

mod access;
mod contracts;
mod exchange;
mod governor;
mod timelock;
mod token;
mod world;

use std::sync::{Mutex, MutexGuard};

use alloy_core::primitives::{Address, B256, U256, keccak256};
use anyhow::Context;

use crate::{
    abi::{AbiValue, decode_output, encode_call},
    chain::{ChainClient, ChainNetwork, DeployedContract, TxReceipt},
    errors::ChainError,
};

pub(crate) use world::World;

/// Timestamp of the genesis block.
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Number of funded accounts exposed by the simulated chain.
const ACCOUNT_COUNT: usize = 10;

const BASE_TX_GAS: u64 = 21_000;
const CREATE_GAS: u64 = 32_000;
const CALLDATA_BYTE_GAS: u64 = 16;

/// Build a revert error carrying `reason` verbatim.
pub(crate) fn revert(reason: impl Into<String>) -> anyhow::Error {
    ChainError::Reverted {
        reason: reason.into(),
    }
    .into()
}

/// An automining in-memory chain.
#[derive(Debug)]
pub struct SimulatedChain {
    network: ChainNetwork,
    accounts: Vec<Address>,
    sender: Address,
    world: Mutex<World>,
}

impl SimulatedChain {
    pub fn new(chain_id: u64, name: impl Into<String>) -> Self {
        let accounts = (0..ACCOUNT_COUNT)
            .map(|i| Address::from_word(keccak256(format!("govsmith-sim-account-{}", i))))
            .collect::<Vec<_>>();
        let sender = accounts[0];

        Self {
            network: ChainNetwork {
                chain_id,
                name: name.into(),
            },
            accounts,
            sender,
            world: Mutex::new(World::new(GENESIS_TIMESTAMP)),
        }
    }

    /// The funded accounts. The first one is the deployer.
    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.lock()?.block_number())
    }

    /// Send a transaction from an arbitrary account.
    pub fn send_from(
        &self,
        from: Address,
        to: Address,
        signature: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<TxReceipt> {
        let calldata = encode_call(signature, args)?;
        let gas = BASE_TX_GAS + CALLDATA_BYTE_GAS * calldata.len() as u64;

        let (_, receipt) = self.transact(from, calldata.as_ref(), gas, 1, |world| {
            world.call(from, to, &calldata)
        })?;

        tracing::debug!(
            from = %from,
            to = %to,
            function = %signature,
            block = receipt.block_number,
            "Simulated transaction mined"
        );

        Ok(receipt)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, World>> {
        self.world
            .lock()
            .map_err(|_| anyhow::anyhow!("Simulated chain state is poisoned"))
    }

    /// Run `f` as a transaction mined in a fresh block. On error the ledger is
    /// restored to its state before the transaction.
    fn transact<T>(
        &self,
        from: Address,
        payload: &[u8],
        gas_used: u64,
        confirmations: u64,
        f: impl FnOnce(&mut World) -> anyhow::Result<T>,
    ) -> anyhow::Result<(T, TxReceipt)> {
        let mut world = self.lock()?;
        let snapshot = world.clone();

        let nonce = world.bump_nonce(from);
        world.mine();

        let output = match f(&mut world) {
            Ok(output) => output,
            Err(e) => {
                *world = snapshot;
                return Err(e);
            }
        };

        let block_number = world.block_number();
        for _ in 1..confirmations {
            world.mine();
        }

        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(payload);

        Ok((
            output,
            TxReceipt {
                tx_hash: keccak256(preimage),
                block_number,
                confirmations: confirmations.max(1),
                gas_used,
            },
        ))
    }
}

impl ChainClient for SimulatedChain {
    async fn network(&self) -> anyhow::Result<ChainNetwork> {
        Ok(self.network.clone())
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy(
        &self,
        contract: &str,
        args: &[AbiValue],
        confirmations: u64,
    ) -> anyhow::Result<DeployedContract> {
        let payload = serde_json::to_vec(args).context("Failed to serialize constructor arguments")?;
        let gas = BASE_TX_GAS + CREATE_GAS + CALLDATA_BYTE_GAS * 32 * args.len() as u64;
        let sender = self.sender;

        let (address, receipt) = self.transact(sender, &payload, gas, confirmations, |world| {
            world.deploy(sender, contract, args)
        })?;

        tracing::debug!(
            contract = %contract,
            address = %address,
            block = receipt.block_number,
            "Simulated contract deployed"
        );

        Ok(DeployedContract { address, receipt })
    }

    async fn call(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Vec<AbiValue>> {
        let calldata = encode_call(signature, args)?;

        // Views run against a copy so nothing they do can persist.
        let mut view = self.lock()?.clone();
        let output = view.call(self.sender, to, &calldata)?;

        decode_output(signature, &output)
    }

    async fn send(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiValue],
        value: U256,
        confirmations: u64,
    ) -> anyhow::Result<TxReceipt> {
        if !value.is_zero() {
            anyhow::bail!("The simulated chain does not model ether transfers");
        }

        let calldata = encode_call(signature, args)?;
        let gas = BASE_TX_GAS + CALLDATA_BYTE_GAS * calldata.len() as u64;
        let sender = self.sender;

        let (_, receipt) = self.transact(sender, calldata.as_ref(), gas, confirmations, |world| {
            world.call(sender, to, &calldata)
        })?;

        tracing::debug!(
            to = %to,
            function = %signature,
            block = receipt.block_number,
            "Simulated transaction mined"
        );

        Ok(receipt)
    }

    async fn advance_blocks(&self, blocks: u64) -> anyhow::Result<()> {
        let mut world = self.lock()?;
        for _ in 0..blocks {
            world.mine();
        }
        tracing::info!(blocks, head = world.block_number(), "Moved blocks");
        Ok(())
    }

    async fn advance_time(&self, seconds: u64) -> anyhow::Result<()> {
        let mut world = self.lock()?;
        world.increase_time(seconds);
        tracing::info!(seconds, "Moved forward in time");
        Ok(())
    }
}

/// Salt the governor passes to the timelock for a proposal.
pub(crate) fn timelock_salt(governor: Address, description_hash: B256) -> B256 {
    let mut salt = B256::ZERO;
    salt[..20].copy_from_slice(governor.as_slice());
    salt ^ description_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::role_id;

    fn mock_token_args() -> Vec<AbiValue> {
        vec!["DAI Token Mock".into(), "DAI".into()]
    }

    #[tokio::test]
    async fn test_every_transaction_mines_a_block() {
        let chain = SimulatedChain::new(31337, "hardhat");
        assert_eq!(chain.block_number().unwrap(), 0);

        let deployed = chain
            .deploy("ERC20TokenMock", &mock_token_args(), 1)
            .await
            .unwrap();
        assert_eq!(deployed.receipt.block_number, 1);

        chain
            .send(
                deployed.address,
                "transfer(address,uint256)",
                &[chain.accounts()[1].into(), AbiValue::uint(10)],
                U256::ZERO,
                3,
            )
            .await
            .unwrap();
        // one block for the transaction, two more for the extra confirmations
        assert_eq!(chain.block_number().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_contract_addresses_follow_sender_nonce() {
        let chain = SimulatedChain::new(31337, "hardhat");
        let sender = chain.sender();

        let first = chain
            .deploy("ERC20TokenMock", &mock_token_args(), 1)
            .await
            .unwrap();
        let second = chain
            .deploy("ERC20TokenMock", &mock_token_args(), 1)
            .await
            .unwrap();

        assert_eq!(first.address, sender.create(0));
        assert_eq!(second.address, sender.create(1));
    }

    #[tokio::test]
    async fn test_reverted_transaction_leaves_no_trace() {
        let chain = SimulatedChain::new(31337, "hardhat");
        let token = chain
            .deploy("ERC20TokenMock", &mock_token_args(), 1)
            .await
            .unwrap()
            .address;
        let head = chain.block_number().unwrap();

        let err = chain
            .send_from(
                chain.accounts()[1],
                token,
                "transfer(address,uint256)",
                &[chain.accounts()[2].into(), AbiValue::uint(1)],
            )
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<ChainError>().and_then(|e| e.revert_reason()),
            Some("ERC20: transfer amount exceeds balance")
        );
        assert_eq!(chain.block_number().unwrap(), head);
    }

    #[tokio::test]
    async fn test_unknown_contract() {
        let chain = SimulatedChain::new(31337, "hardhat");
        let err = chain.deploy("UniswapRouter", &[], 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChainError>(),
            Some(ChainError::UnknownContract(_))
        ));
    }

    #[tokio::test]
    async fn test_timelock_missing_role_message() {
        let chain = SimulatedChain::new(31337, "hardhat");
        let deployer = chain.sender();
        let timelock = chain
            .deploy(
                "TimeLock",
                &[
                    AbiValue::uint(3600),
                    AbiValue::Array(vec![]),
                    AbiValue::Array(vec![]),
                    deployer.into(),
                ],
                1,
            )
            .await
            .unwrap()
            .address;

        let outsider = chain.accounts()[1];
        let err = chain
            .send_from(
                outsider,
                timelock,
                "grantRole(bytes32,address)",
                &[role_id("PROPOSER_ROLE").into(), outsider.into()],
            )
            .unwrap_err();

        let expected = format!(
            "AccessControl: account {} is missing role {}",
            crate::abi::to_hex(outsider),
            crate::abi::to_hex(role_id("TIMELOCK_ADMIN_ROLE")),
        );
        assert_eq!(
            err.downcast_ref::<ChainError>().and_then(|e| e.revert_reason()),
            Some(expected.as_str())
        );
    }

    #[test]
    fn test_timelock_salt_mixes_governor_address() {
        let description = crate::abi::description_hash("Proposal #1");
        let a = timelock_salt(Address::repeat_byte(1), description);
        let b = timelock_salt(Address::repeat_byte(2), description);
        assert_ne!(a, b);
        assert_eq!(a[20..], description[20..]);
    }
}
