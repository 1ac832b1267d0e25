use super::{
    exchange::{DeFiExchange, LiquidityPoolNft},
    governor::Governor,
    revert,
    timelock::TimeLock,
    token::{Erc20Mock, GovernanceToken},
    world::{Env, World},
};
use crate::{
    abi::{AbiValue, decode_params, encode_params, parse_function},
    errors::ChainError,
};

/// Contract models the simulated chain can deploy.
#[derive(Debug, Clone)]
pub(crate) enum SimContract {
    Erc20Mock(Erc20Mock),
    GovernanceToken(GovernanceToken),
    TimeLock(TimeLock),
    Governor(Governor),
    DeFiExchange(DeFiExchange),
    LiquidityPoolNft(LiquidityPoolNft),
}

impl SimContract {
    /// Run the constructor of the artifact named `contract`.
    pub fn construct(contract: &str, env: &Env, args: &[AbiValue]) -> anyhow::Result<Self> {
        let constructor = match contract {
            "ERC20TokenMock" => Erc20Mock::CONSTRUCTOR,
            "GovernanceToken" => GovernanceToken::CONSTRUCTOR,
            "TimeLock" => TimeLock::CONSTRUCTOR,
            "GovernorContract" => Governor::CONSTRUCTOR,
            "DeFiExchange" => DeFiExchange::CONSTRUCTOR,
            "LiquidityPoolNFT" => LiquidityPoolNft::CONSTRUCTOR,
            other => return Err(ChainError::UnknownContract(other.to_string()).into()),
        };

        // Round-trip through the encoder so argument types are checked the way a
        // real deployment would check them.
        let params = parse_function(constructor)?.inputs;
        let encoded = encode_params(&params, args)?;
        let args = decode_params(&params, &encoded)?;

        let model = match contract {
            "ERC20TokenMock" => Self::Erc20Mock(Erc20Mock::new(env, &args)?),
            "GovernanceToken" => Self::GovernanceToken(GovernanceToken::new(env)?),
            "TimeLock" => Self::TimeLock(TimeLock::new(env, &args)?),
            "GovernorContract" => Self::Governor(Governor::new(&args)?),
            "DeFiExchange" => Self::DeFiExchange(DeFiExchange::new(env, &args)?),
            _ => Self::LiquidityPoolNft(LiquidityPoolNft::default()),
        };

        Ok(model)
    }

    fn signatures(&self) -> &'static [&'static str] {
        match self {
            Self::Erc20Mock(_) => Erc20Mock::SIGNATURES,
            Self::GovernanceToken(_) => GovernanceToken::SIGNATURES,
            Self::TimeLock(_) => TimeLock::SIGNATURES,
            Self::Governor(_) => Governor::SIGNATURES,
            Self::DeFiExchange(_) => DeFiExchange::SIGNATURES,
            Self::LiquidityPoolNft(_) => LiquidityPoolNft::SIGNATURES,
        }
    }

    /// Dispatch raw calldata by selector.
    pub fn execute(&mut self, world: &mut World, env: &Env, calldata: &[u8]) -> anyhow::Result<Vec<u8>> {
        let Some(selector) = calldata.get(..4) else {
            return Err(revert(
                "function selector was not recognized and there's no fallback function",
            ));
        };

        for signature in self.signatures() {
            let function = parse_function(signature)?;
            if function.selector().as_slice() != selector {
                continue;
            }

            let args = decode_params(&function.inputs, &calldata[4..])
                .map_err(|_| revert("invalid calldata"))?;
            let name = function.name.as_str();

            let outputs = match self {
                Self::Erc20Mock(c) => c.handle(env, name, &args)?,
                Self::GovernanceToken(c) => c.handle(env, name, &args)?,
                Self::TimeLock(c) => c.handle(world, env, name, &args)?,
                Self::Governor(c) => c.handle(world, env, name, &args)?,
                Self::DeFiExchange(c) => c.handle(env, name, &args)?,
                Self::LiquidityPoolNft(c) => c.handle(env, name, &args)?,
            };

            return encode_params(&function.outputs, &outputs);
        }

        Err(revert(
            "function selector was not recognized and there's no fallback function",
        ))
    }
}

/// Error for a signature listed in a model but not handled by it.
pub(crate) fn unhandled(contract: &str, function: &str) -> anyhow::Error {
    anyhow::anyhow!("{} model does not implement `{}`", contract, function)
}
