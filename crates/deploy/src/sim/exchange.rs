use alloy_core::primitives::{Address, U256};

use super::{access::Ownable, contracts::unhandled, revert, world::Env};
use crate::abi::AbiValue;

/// `DeFiExchange(dai, usdt, withdrawFeePercentage)`. Only the fee configuration
/// surface is modelled.
#[derive(Debug, Clone)]
pub(crate) struct DeFiExchange {
    ownable: Ownable,
    dai: Address,
    usdt: Address,
    withdraw_fee_percentage: u8,
}

impl DeFiExchange {
    pub const CONSTRUCTOR: &'static str = "DeFiExchange(address,address,uint8)";

    pub const SIGNATURES: &'static [&'static str] = &[
        "owner() returns (address)",
        "transferOwnership(address)",
        "renounceOwnership()",
        "s_daiToken() returns (address)",
        "s_usdtToken() returns (address)",
        "s_withdrawFeePercentage() returns (uint8)",
        "getWithdrawFeePercentage() returns (uint8)",
        "changeWithdrawFeePercentage(uint8)",
    ];

    pub fn new(env: &Env, args: &[AbiValue]) -> anyhow::Result<Self> {
        Ok(Self {
            ownable: Ownable::new(env.sender),
            dai: args[0].as_address()?,
            usdt: args[1].as_address()?,
            withdraw_fee_percentage: Self::fee(&args[2])?,
        })
    }

    fn fee(value: &AbiValue) -> anyhow::Result<u8> {
        let fee = value.as_u64()?;
        if fee > 100 {
            return Err(revert("DeFiExchange__InvalidNewWithdrawFeePercentage"));
        }
        Ok(fee as u8)
    }

    pub fn handle(&mut self, env: &Env, function: &str, args: &[AbiValue]) -> anyhow::Result<Vec<AbiValue>> {
        if let Some(outputs) = self.ownable.handle(env, function, args)? {
            return Ok(outputs);
        }

        let outputs = match function {
            "s_daiToken" => vec![self.dai.into()],
            "s_usdtToken" => vec![self.usdt.into()],
            "s_withdrawFeePercentage" | "getWithdrawFeePercentage" => {
                vec![AbiValue::uint(self.withdraw_fee_percentage as u64)]
            }
            "changeWithdrawFeePercentage" => {
                self.ownable.check_owner(env.sender)?;
                self.withdraw_fee_percentage = Self::fee(&args[0])?;
                vec![]
            }
            other => return Err(unhandled("DeFiExchange", other)),
        };
        Ok(outputs)
    }
}

/// `LiquidityPoolNFT`: position NFTs minted by the liquidity pool, which is set
/// once through `initialize`.
#[derive(Debug, Clone, Default)]
pub(crate) struct LiquidityPoolNft {
    liquidity_pool: Address,
    token_counter: U256,
}

impl LiquidityPoolNft {
    pub const CONSTRUCTOR: &'static str = "LiquidityPoolNFT()";

    pub const SIGNATURES: &'static [&'static str] = &[
        "initialize(address)",
        "getLiquidityPoolContractAddress() returns (address)",
        "getTokenCounter() returns (uint256)",
    ];

    pub fn handle(&mut self, _env: &Env, function: &str, args: &[AbiValue]) -> anyhow::Result<Vec<AbiValue>> {
        let outputs = match function {
            "initialize" => {
                if !self.liquidity_pool.is_zero() {
                    return Err(revert("LiquidityPoolNFT__LiquidityPoolContractAlreadySet"));
                }
                self.liquidity_pool = args[0].as_address()?;
                vec![]
            }
            "getLiquidityPoolContractAddress" => vec![self.liquidity_pool.into()],
            "getTokenCounter" => vec![self.token_counter.into()],
            other => return Err(unhandled("LiquidityPoolNFT", other)),
        };
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(sender: Address) -> Env {
        Env {
            sender,
            this: Address::repeat_byte(0xee),
            block: 1,
            timestamp: 0,
        }
    }

    #[test]
    fn test_fee_change_is_owner_only() {
        let owner = Address::repeat_byte(1);
        let mut exchange = DeFiExchange::new(
            &env(owner),
            &[Address::ZERO.into(), Address::ZERO.into(), AbiValue::uint(1)],
        )
        .unwrap();

        let err = exchange
            .handle(&env(Address::repeat_byte(2)), "changeWithdrawFeePercentage", &[AbiValue::uint(55)])
            .unwrap_err();
        assert!(err.to_string().contains("Ownable: caller is not the owner"));

        exchange
            .handle(&env(owner), "changeWithdrawFeePercentage", &[AbiValue::uint(99)])
            .unwrap();
        assert_eq!(exchange.withdraw_fee_percentage, 99);

        let err = exchange
            .handle(&env(owner), "changeWithdrawFeePercentage", &[AbiValue::uint(101)])
            .unwrap_err();
        assert!(err.to_string().contains("DeFiExchange__InvalidNewWithdrawFeePercentage"));
    }

    #[test]
    fn test_nft_initialize_once() {
        let mut nft = LiquidityPoolNft::default();
        let pool = Address::repeat_byte(3);
        nft.handle(&env(pool), "initialize", &[pool.into()]).unwrap();
        let err = nft.handle(&env(pool), "initialize", &[pool.into()]).unwrap_err();
        assert!(err.to_string().contains("LiquidityPoolNFT__LiquidityPoolContractAlreadySet"));
    }
}
