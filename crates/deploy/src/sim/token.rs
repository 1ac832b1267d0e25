//! ERC-20 token models: the mock stablecoins and the voting governance token.

use std::collections::HashMap;

use alloy_core::primitives::{Address, U256};

use super::{contracts::unhandled, revert, world::Env};
use crate::abi::AbiValue;

/// Supply minted to the deployer by both token models, in whole tokens.
const INITIAL_SUPPLY: u64 = 1_000_000;
const DECIMALS: u8 = 18;

fn initial_supply() -> U256 {
    U256::from(INITIAL_SUPPLY) * U256::from(10).pow(U256::from(DECIMALS))
}

/// Balances, allowances and the standard ERC-20 surface.
#[derive(Debug, Clone, Default)]
pub(crate) struct Erc20 {
    name: String,
    symbol: String,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl Erc20 {
    fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    fn mint(&mut self, to: Address, amount: U256) -> anyhow::Result<()> {
        if to.is_zero() {
            return Err(revert("ERC20: mint to the zero address"));
        }
        self.total_supply += amount;
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    fn burn(&mut self, from: Address, amount: U256) -> anyhow::Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(revert("ERC20: burn amount exceeds balance"));
        }
        self.balances.insert(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> anyhow::Result<()> {
        if to.is_zero() {
            return Err(revert("ERC20: transfer to the zero address"));
        }
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(revert("ERC20: transfer amount exceeds balance"));
        }
        self.balances.insert(from, balance - amount);
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    fn spend_allowance(&mut self, owner: Address, spender: Address, amount: U256) -> anyhow::Result<()> {
        let allowance = self.allowances.get(&(owner, spender)).copied().unwrap_or_default();
        if allowance == U256::MAX {
            return Ok(());
        }
        if allowance < amount {
            return Err(revert("ERC20: insufficient allowance"));
        }
        self.allowances.insert((owner, spender), allowance - amount);
        Ok(())
    }

    /// Views and approvals. Transfers are handled by the owning model so it can
    /// hook balance movements.
    fn handle_common(&mut self, env: &Env, function: &str, args: &[AbiValue]) -> anyhow::Result<Option<Vec<AbiValue>>> {
        let outputs = match function {
            "name" => vec![self.name.clone().into()],
            "symbol" => vec![self.symbol.clone().into()],
            "decimals" => vec![AbiValue::uint(DECIMALS as u64)],
            "totalSupply" => vec![self.total_supply.into()],
            "balanceOf" => vec![self.balance_of(args[0].as_address()?).into()],
            "allowance" => {
                let key = (args[0].as_address()?, args[1].as_address()?);
                vec![self.allowances.get(&key).copied().unwrap_or_default().into()]
            }
            "approve" => {
                let spender = args[0].as_address()?;
                if spender.is_zero() {
                    return Err(revert("ERC20: approve to the zero address"));
                }
                self.allowances.insert((env.sender, spender), args[1].as_uint()?);
                vec![true.into()]
            }
            _ => return Ok(None),
        };
        Ok(Some(outputs))
    }

    /// Decode `transfer` / `transferFrom` into `(from, to, amount)`, spending
    /// allowance where needed.
    fn movement(&mut self, env: &Env, function: &str, args: &[AbiValue]) -> anyhow::Result<Option<(Address, Address, U256)>> {
        match function {
            "transfer" => Ok(Some((env.sender, args[0].as_address()?, args[1].as_uint()?))),
            "transferFrom" => {
                let from = args[0].as_address()?;
                let amount = args[2].as_uint()?;
                self.spend_allowance(from, env.sender, amount)?;
                Ok(Some((from, args[1].as_address()?, amount)))
            }
            _ => Ok(None),
        }
    }
}

/// `ERC20TokenMock(name, symbol)`: mints the initial supply to the deployer.
#[derive(Debug, Clone)]
pub(crate) struct Erc20Mock {
    erc20: Erc20,
}

impl Erc20Mock {
    pub const CONSTRUCTOR: &'static str = "ERC20TokenMock(string,string)";

    pub const SIGNATURES: &'static [&'static str] = &[
        "name() returns (string)",
        "symbol() returns (string)",
        "decimals() returns (uint8)",
        "totalSupply() returns (uint256)",
        "balanceOf(address) returns (uint256)",
        "allowance(address,address) returns (uint256)",
        "approve(address,uint256) returns (bool)",
        "transfer(address,uint256) returns (bool)",
        "transferFrom(address,address,uint256) returns (bool)",
        "mint(address,uint256)",
    ];

    pub fn new(env: &Env, args: &[AbiValue]) -> anyhow::Result<Self> {
        let mut erc20 = Erc20::new(args[0].as_str()?, args[1].as_str()?);
        erc20.mint(env.sender, initial_supply())?;
        Ok(Self { erc20 })
    }

    pub fn handle(&mut self, env: &Env, function: &str, args: &[AbiValue]) -> anyhow::Result<Vec<AbiValue>> {
        if let Some(outputs) = self.erc20.handle_common(env, function, args)? {
            return Ok(outputs);
        }
        if let Some((from, to, amount)) = self.erc20.movement(env, function, args)? {
            self.erc20.transfer(from, to, amount)?;
            return Ok(vec![true.into()]);
        }

        match function {
            "mint" => {
                self.erc20.mint(args[0].as_address()?, args[1].as_uint()?)?;
                Ok(vec![])
            }
            other => Err(unhandled("ERC20TokenMock", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    block: u64,
    votes: U256,
}

/// Value of the last checkpoint at or before `block`.
fn checkpoint_at(checkpoints: &[Checkpoint], block: u64) -> U256 {
    let idx = checkpoints.partition_point(|c| c.block <= block);
    if idx == 0 {
        U256::ZERO
    } else {
        checkpoints[idx - 1].votes
    }
}

fn latest(checkpoints: &[Checkpoint]) -> U256 {
    checkpoints.last().map(|c| c.votes).unwrap_or_default()
}

fn write_checkpoint(checkpoints: &mut Vec<Checkpoint>, block: u64, votes: U256) {
    match checkpoints.last_mut() {
        Some(last) if last.block == block => last.votes = votes,
        _ => checkpoints.push(Checkpoint { block, votes }),
    }
}

/// `GovernanceToken`: ERC-20 with delegated, checkpointed voting power.
///
/// Minting and burning are reserved to the staking contract, which is set once
/// through `initialize`.
#[derive(Debug, Clone)]
pub(crate) struct GovernanceToken {
    erc20: Erc20,
    delegates: HashMap<Address, Address>,
    checkpoints: HashMap<Address, Vec<Checkpoint>>,
    supply_checkpoints: Vec<Checkpoint>,
    staking_contract: Address,
}

impl GovernanceToken {
    pub const CONSTRUCTOR: &'static str = "GovernanceToken()";

    pub const SIGNATURES: &'static [&'static str] = &[
        "name() returns (string)",
        "symbol() returns (string)",
        "decimals() returns (uint8)",
        "totalSupply() returns (uint256)",
        "balanceOf(address) returns (uint256)",
        "allowance(address,address) returns (uint256)",
        "approve(address,uint256) returns (bool)",
        "transfer(address,uint256) returns (bool)",
        "transferFrom(address,address,uint256) returns (bool)",
        "delegate(address)",
        "delegates(address) returns (address)",
        "numCheckpoints(address) returns (uint32)",
        "getVotes(address) returns (uint256)",
        "getPastVotes(address,uint256) returns (uint256)",
        "getPastTotalSupply(uint256) returns (uint256)",
        "initialize(address)",
        "s_stakingContractAddress() returns (address)",
        "mint(address,uint256)",
        "burn(address,uint256)",
    ];

    pub fn new(env: &Env) -> anyhow::Result<Self> {
        let mut token = Self {
            erc20: Erc20::new("GovernanceToken", "GT"),
            delegates: HashMap::new(),
            checkpoints: HashMap::new(),
            supply_checkpoints: Vec::new(),
            staking_contract: Address::ZERO,
        };
        token.mint(env, env.sender, initial_supply())?;
        Ok(token)
    }

    fn delegate_of(&self, account: Address) -> Address {
        self.delegates.get(&account).copied().unwrap_or_default()
    }

    fn votes_of(&self, account: Address) -> &[Checkpoint] {
        self.checkpoints.get(&account).map(Vec::as_slice).unwrap_or_default()
    }

    fn move_voting_power(&mut self, block: u64, src: Address, dst: Address, amount: U256) {
        if src == dst || amount.is_zero() {
            return;
        }
        if !src.is_zero() {
            let checkpoints = self.checkpoints.entry(src).or_default();
            let votes = latest(checkpoints).saturating_sub(amount);
            write_checkpoint(checkpoints, block, votes);
        }
        if !dst.is_zero() {
            let checkpoints = self.checkpoints.entry(dst).or_default();
            let votes = latest(checkpoints) + amount;
            write_checkpoint(checkpoints, block, votes);
        }
    }

    fn mint(&mut self, env: &Env, to: Address, amount: U256) -> anyhow::Result<()> {
        self.erc20.mint(to, amount)?;
        write_checkpoint(&mut self.supply_checkpoints, env.block, self.erc20.total_supply);
        let delegate = self.delegate_of(to);
        self.move_voting_power(env.block, Address::ZERO, delegate, amount);
        Ok(())
    }

    fn burn(&mut self, env: &Env, from: Address, amount: U256) -> anyhow::Result<()> {
        self.erc20.burn(from, amount)?;
        write_checkpoint(&mut self.supply_checkpoints, env.block, self.erc20.total_supply);
        let delegate = self.delegate_of(from);
        self.move_voting_power(env.block, delegate, Address::ZERO, amount);
        Ok(())
    }

    fn check_past_block(env: &Env, block: u64) -> anyhow::Result<()> {
        if block >= env.block {
            return Err(revert("ERC20Votes: future lookup"));
        }
        Ok(())
    }

    fn check_staking_contract(&self, env: &Env) -> anyhow::Result<()> {
        if env.sender != self.staking_contract {
            return Err(revert("GovernanceToken__AllowedOnlyForSkatingContract"));
        }
        Ok(())
    }

    pub fn handle(&mut self, env: &Env, function: &str, args: &[AbiValue]) -> anyhow::Result<Vec<AbiValue>> {
        if let Some(outputs) = self.erc20.handle_common(env, function, args)? {
            return Ok(outputs);
        }
        if let Some((from, to, amount)) = self.erc20.movement(env, function, args)? {
            self.erc20.transfer(from, to, amount)?;
            let (src, dst) = (self.delegate_of(from), self.delegate_of(to));
            self.move_voting_power(env.block, src, dst, amount);
            return Ok(vec![true.into()]);
        }

        let outputs = match function {
            "delegate" => {
                let delegatee = args[0].as_address()?;
                let previous = self.delegate_of(env.sender);
                self.delegates.insert(env.sender, delegatee);
                let balance = self.erc20.balance_of(env.sender);
                self.move_voting_power(env.block, previous, delegatee, balance);
                vec![]
            }
            "delegates" => vec![self.delegate_of(args[0].as_address()?).into()],
            "numCheckpoints" => {
                vec![AbiValue::uint(self.votes_of(args[0].as_address()?).len() as u64)]
            }
            "getVotes" => vec![latest(self.votes_of(args[0].as_address()?)).into()],
            "getPastVotes" => {
                let block = args[1].as_u64()?;
                Self::check_past_block(env, block)?;
                vec![checkpoint_at(self.votes_of(args[0].as_address()?), block).into()]
            }
            "getPastTotalSupply" => {
                let block = args[0].as_u64()?;
                Self::check_past_block(env, block)?;
                vec![checkpoint_at(&self.supply_checkpoints, block).into()]
            }
            "initialize" => {
                if !self.staking_contract.is_zero() {
                    return Err(revert("GovernanceToken__StakingContractAlreadySet"));
                }
                self.staking_contract = args[0].as_address()?;
                vec![]
            }
            "s_stakingContractAddress" => vec![self.staking_contract.into()],
            "mint" => {
                self.check_staking_contract(env)?;
                self.mint(env, args[0].as_address()?, args[1].as_uint()?)?;
                vec![]
            }
            "burn" => {
                self.check_staking_contract(env)?;
                self.burn(env, args[0].as_address()?, args[1].as_uint()?)?;
                vec![]
            }
            other => return Err(unhandled("GovernanceToken", other)),
        };
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(sender: Address, block: u64) -> Env {
        Env {
            sender,
            this: Address::repeat_byte(0xee),
            block,
            timestamp: 0,
        }
    }

    #[test]
    fn test_votes_follow_delegation_checkpoints() {
        let holder = Address::repeat_byte(1);
        let mut token = GovernanceToken::new(&env(holder, 1)).unwrap();

        // Undelegated balances carry no voting power.
        assert_eq!(latest(token.votes_of(holder)), U256::ZERO);

        token.handle(&env(holder, 3), "delegate", &[holder.into()]).unwrap();

        let at = |token: &mut GovernanceToken, block: u64| {
            token
                .handle(&env(holder, 10), "getPastVotes", &[holder.into(), AbiValue::uint(block)])
                .unwrap()[0]
                .as_uint()
                .unwrap()
        };
        assert_eq!(at(&mut token, 2), U256::ZERO);
        assert_eq!(at(&mut token, 3), initial_supply());
        assert_eq!(at(&mut token, 9), initial_supply());
    }

    #[test]
    fn test_future_lookup_reverts() {
        let holder = Address::repeat_byte(1);
        let mut token = GovernanceToken::new(&env(holder, 1)).unwrap();
        let err = token
            .handle(&env(holder, 5), "getPastTotalSupply", &[AbiValue::uint(5)])
            .unwrap_err();
        assert!(err.to_string().contains("ERC20Votes: future lookup"));
    }

    #[test]
    fn test_initialize_is_single_use() {
        let holder = Address::repeat_byte(1);
        let exchange = Address::repeat_byte(2);
        let mut token = GovernanceToken::new(&env(holder, 1)).unwrap();

        token.handle(&env(holder, 2), "initialize", &[exchange.into()]).unwrap();
        let err = token
            .handle(&env(holder, 3), "initialize", &[exchange.into()])
            .unwrap_err();
        assert!(err.to_string().contains("GovernanceToken__StakingContractAlreadySet"));
    }

    #[test]
    fn test_mint_reserved_to_staking_contract() {
        let holder = Address::repeat_byte(1);
        let staking = Address::repeat_byte(2);
        let mut token = GovernanceToken::new(&env(holder, 1)).unwrap();
        token.handle(&env(holder, 2), "initialize", &[staking.into()]).unwrap();

        let err = token
            .handle(&env(holder, 3), "mint", &[holder.into(), AbiValue::uint(1)])
            .unwrap_err();
        assert!(err.to_string().contains("GovernanceToken__AllowedOnlyForSkatingContract"));

        token
            .handle(&env(staking, 4), "mint", &[holder.into(), AbiValue::uint(1)])
            .unwrap();
        assert_eq!(token.erc20.balance_of(holder), initial_supply() + U256::from(1));
    }
}
