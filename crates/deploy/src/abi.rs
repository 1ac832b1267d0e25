//! ABI values and encoding helpers.
//!
//! Contract calls are described with human-readable signatures such as
//! `"grantRole(bytes32,address)"` or `"state(uint256) returns (uint8)"`. Arguments
//! and return values travel as [`AbiValue`], which is serializable so that
//! constructor arguments can be recorded in the deployment registry.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::{Function, Param},
    primitives::{Address, B256, Bytes, U256, keccak256},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A value passed to or returned from a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    FixedBytes(B256),
    Array(Vec<AbiValue>),
}

impl AbiValue {
    pub fn uint(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }

    pub fn as_address(&self) -> Result<Address> {
        match self {
            Self::Address(address) => Ok(*address),
            other => anyhow::bail!("Expected an address, got {:?}", other),
        }
    }

    pub fn as_uint(&self) -> Result<U256> {
        match self {
            Self::Uint(value) => Ok(*value),
            other => anyhow::bail!("Expected an unsigned integer, got {:?}", other),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        let value = self.as_uint()?;
        u64::try_from(value).map_err(|_| anyhow::anyhow!("Value {} does not fit in u64", value))
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(value) => Ok(*value),
            other => anyhow::bail!("Expected a bool, got {:?}", other),
        }
    }

    pub fn as_fixed_bytes(&self) -> Result<B256> {
        match self {
            Self::FixedBytes(word) => Ok(*word),
            other => anyhow::bail!("Expected bytes32, got {:?}", other),
        }
    }

    pub fn as_bytes(&self) -> Result<&Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            other => anyhow::bail!("Expected bytes, got {:?}", other),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(value) => Ok(value),
            other => anyhow::bail!("Expected a string, got {:?}", other),
        }
    }

    pub fn as_array(&self) -> Result<&[AbiValue]> {
        match self {
            Self::Array(values) => Ok(values),
            other => anyhow::bail!("Expected an array, got {:?}", other),
        }
    }

    /// Convert into a dynamic Solidity value of the given type.
    ///
    /// The type drives integer widths and fixed-bytes sizes, which [`AbiValue`]
    /// does not carry.
    pub fn to_sol_value(&self, ty: &DynSolType) -> Result<DynSolValue> {
        let value = match (ty, self) {
            (DynSolType::Address, Self::Address(address)) => DynSolValue::Address(*address),
            (DynSolType::Uint(bits), Self::Uint(value)) => DynSolValue::Uint(*value, *bits),
            (DynSolType::Bool, Self::Bool(value)) => DynSolValue::Bool(*value),
            (DynSolType::String, Self::String(value)) => DynSolValue::String(value.clone()),
            (DynSolType::Bytes, Self::Bytes(bytes)) => DynSolValue::Bytes(bytes.to_vec()),
            (DynSolType::FixedBytes(size), Self::FixedBytes(word)) => {
                DynSolValue::FixedBytes(*word, *size)
            }
            (DynSolType::Array(inner), Self::Array(values)) => DynSolValue::Array(
                values
                    .iter()
                    .map(|value| value.to_sol_value(inner))
                    .collect::<Result<_>>()?,
            ),
            (DynSolType::FixedArray(inner, len), Self::Array(values)) if values.len() == *len => {
                DynSolValue::FixedArray(
                    values
                        .iter()
                        .map(|value| value.to_sol_value(inner))
                        .collect::<Result<_>>()?,
                )
            }
            (ty, value) => anyhow::bail!("Cannot encode {:?} as {}", value, ty),
        };
        Ok(value)
    }

    /// Convert a decoded dynamic Solidity value. Tuples become arrays.
    pub fn from_sol_value(value: DynSolValue) -> Result<Self> {
        let value = match value {
            DynSolValue::Address(address) => Self::Address(address),
            DynSolValue::Uint(value, _) => Self::Uint(value),
            DynSolValue::Bool(value) => Self::Bool(value),
            DynSolValue::String(value) => Self::String(value),
            DynSolValue::Bytes(bytes) => Self::Bytes(bytes.into()),
            DynSolValue::FixedBytes(word, _) => Self::FixedBytes(word),
            DynSolValue::Array(values)
            | DynSolValue::FixedArray(values)
            | DynSolValue::Tuple(values) => Self::Array(
                values
                    .into_iter()
                    .map(Self::from_sol_value)
                    .collect::<Result<_>>()?,
            ),
            other => anyhow::bail!("Unsupported ABI value: {:?}", other),
        };
        Ok(value)
    }
}

impl From<Address> for AbiValue {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<U256> for AbiValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<B256> for AbiValue {
    fn from(word: B256) -> Self {
        Self::FixedBytes(word)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AbiValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for AbiValue {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

/// Parse a human-readable function signature.
pub fn parse_function(signature: &str) -> Result<Function> {
    Function::parse(signature)
        .map_err(|e| anyhow::anyhow!("Invalid function signature `{}`: {}", signature, e))
}

fn resolve_params(params: &[Param]) -> Result<Vec<DynSolType>> {
    params
        .iter()
        .map(|param| {
            param
                .resolve()
                .with_context(|| format!("Unsupported parameter type `{}`", param.ty))
        })
        .collect()
}

/// ABI-encode a list of values against parameter types, without selector.
pub fn encode_params(params: &[Param], args: &[AbiValue]) -> Result<Vec<u8>> {
    let types = resolve_params(params)?;
    if types.len() != args.len() {
        anyhow::bail!(
            "Expected {} arguments, got {}",
            types.len(),
            args.len()
        );
    }

    let values = types
        .iter()
        .zip(args)
        .map(|(ty, arg)| arg.to_sol_value(ty))
        .collect::<Result<Vec<_>>>()?;

    Ok(DynSolValue::Tuple(values).abi_encode_params())
}

/// Decode ABI data against parameter types.
pub fn decode_params(params: &[Param], data: &[u8]) -> Result<Vec<AbiValue>> {
    let types = resolve_params(params)?;
    if types.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = DynSolType::Tuple(types)
        .abi_decode_params(data)
        .context("Failed to decode ABI data")?;

    match AbiValue::from_sol_value(decoded)? {
        AbiValue::Array(values) => Ok(values),
        value => Ok(vec![value]),
    }
}

/// Encode a call to `signature` with `args`, selector included.
pub fn encode_call(signature: &str, args: &[AbiValue]) -> Result<Bytes> {
    let function = parse_function(signature)?;
    let params = encode_params(&function.inputs, args)
        .with_context(|| format!("Failed to encode arguments for `{}`", signature))?;

    let mut calldata = function.selector().to_vec();
    calldata.extend_from_slice(&params);
    Ok(calldata.into())
}

/// Decode the return data of a call to `signature`.
pub fn decode_output(signature: &str, data: &[u8]) -> Result<Vec<AbiValue>> {
    let function = parse_function(signature)?;
    decode_params(&function.outputs, data)
        .with_context(|| format!("Failed to decode output of `{}`", signature))
}

/// Hash of a proposal description, used to bind queue/execute to the propose call.
pub fn description_hash(description: &str) -> B256 {
    keccak256(description.as_bytes())
}

/// Identifier of an access-control role (`keccak256("PROPOSER_ROLE")`, ...).
pub fn role_id(role: &str) -> B256 {
    keccak256(role.as_bytes())
}

/// Content-derived proposal identifier.
///
/// `uint256(keccak256(abi.encode(targets, values, calldatas, descriptionHash)))`,
/// the same derivation the governor uses on chain.
pub fn hash_proposal(
    targets: &[Address],
    values: &[U256],
    calldatas: &[Bytes],
    description_hash: B256,
) -> U256 {
    let encoded = DynSolValue::Tuple(vec![
        DynSolValue::Array(targets.iter().copied().map(DynSolValue::Address).collect()),
        DynSolValue::Array(values.iter().map(|v| DynSolValue::Uint(*v, 256)).collect()),
        DynSolValue::Array(
            calldatas
                .iter()
                .map(|data| DynSolValue::Bytes(data.to_vec()))
                .collect(),
        ),
        DynSolValue::FixedBytes(description_hash, 32),
    ])
    .abi_encode_params();

    U256::from_be_bytes(keccak256(encoded).0)
}

/// Lowercase `0x`-prefixed hex, the format revert strings use for accounts and roles.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call_selector() {
        let calldata = encode_call(
            "transferOwnership(address)",
            &[AbiValue::Address(Address::repeat_byte(0x11))],
        )
        .unwrap();

        // keccak256("transferOwnership(address)")[..4]
        assert_eq!(hex::encode(&calldata[..4]), "f2fde38b");
        assert_eq!(calldata.len(), 4 + 32);
    }

    #[test]
    fn test_encode_call_rejects_wrong_arity() {
        let result = encode_call("changeWithdrawFeePercentage(uint8)", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_call_rejects_wrong_type() {
        let result = encode_call("delegate(address)", &[AbiValue::Bool(true)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_output_uint8() {
        let mut word = [0u8; 32];
        word[31] = 5;
        let values = decode_output("state(uint256) returns (uint8)", &word).unwrap();
        assert_eq!(values, vec![AbiValue::uint(5)]);
    }

    #[test]
    fn test_decode_output_without_returns_is_empty() {
        let values = decode_output("execute()", &[]).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_role_id_matches_known_constant() {
        assert_eq!(
            to_hex(role_id("PROPOSER_ROLE")),
            "0xb09aa5aeb3702cfd50b6b62bc4532604938f21248a27a1d5ca736082b6819cc1"
        );
    }

    #[test]
    fn test_hash_proposal_depends_on_description() {
        let targets = [Address::repeat_byte(0x22)];
        let values = [U256::ZERO];
        let calldatas = [encode_call("changeWithdrawFeePercentage(uint8)", &[AbiValue::uint(5)]).unwrap()];

        let a = hash_proposal(&targets, &values, &calldatas, description_hash("first"));
        let b = hash_proposal(&targets, &values, &calldatas, description_hash("second"));
        let a_again = hash_proposal(&targets, &values, &calldatas, description_hash("first"));

        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }

    #[test]
    fn test_hash_proposal_matches_governor_encoding() {
        use alloy_core::sol_types::SolValue;

        let targets = vec![Address::repeat_byte(0x11)];
        let values = vec![U256::ZERO];
        let calldatas = vec![encode_call("changeWithdrawFeePercentage(uint8)", &[AbiValue::uint(5)]).unwrap()];
        let description = description_hash("Proposal #1");

        let id = hash_proposal(&targets, &values, &calldatas, description);

        assert_eq!(
            to_hex(description),
            "0x9585b1a02309e5b18f3a4d9760453a04488daecc987eccfeebe4f6486ca5e390"
        );
        assert_eq!(
            to_hex(id.to_be_bytes::<32>()),
            "0xb145294c699f5eceab42fdd603ab946489f966fe52376e776515a2d314bd6ddf"
        );

        // keccak256(abi.encode(targets, values, calldatas, descriptionHash))
        let encoded = (targets, values, calldatas, description).abi_encode_params();
        assert_eq!(id, U256::from_be_bytes(keccak256(encoded).0));
    }

    #[test]
    fn test_abi_value_serde_shape() {
        let value = AbiValue::Array(vec![AbiValue::uint(3600), AbiValue::Bool(false)]);
        let json = serde_json::to_string(&value).unwrap();
        let back: AbiValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
        assert!(json.contains("\"type\":\"array\""));
    }
}
