//! Minimal ABI encoding for constructor arguments and single-word calls.
//!
//! Only static types are supported (`address`, `uintN`, `bool`, `bytes32`):
//! every argument of the deployed contracts' constructors, configuration
//! setters and smoke-test getters is one of those.

use ethereum_types::{Address, H256, U256};

use crate::utils::keccak;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Address(Address),
    Uint(U256),
    Bool(bool),
    FixedBytes(H256),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CalldataError {
    #[error("malformed function signature `{0}`")]
    InvalidSignature(String),
    #[error("unsupported ABI type `{0}`")]
    UnsupportedType(String),
    #[error("`{signature}` takes {expected} argument(s), got {got}")]
    WrongArgumentCount {
        signature: String,
        expected: usize,
        got: usize,
    },
    #[error("argument {index} of `{signature}` must be `{expected}`")]
    TypeMismatch {
        signature: String,
        index: usize,
        expected: String,
    },
    #[error("return data is {0} bytes, expected at least 32")]
    ShortReturnData(usize),
    #[error("return word is not a valid address")]
    DirtyAddressWord,
}

impl Value {
    fn to_word(&self) -> [u8; 32] {
        match self {
            Value::Address(address) => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(address.as_bytes());
                word
            }
            Value::Uint(value) => value.to_big_endian(),
            Value::Bool(flag) => U256::from(u8::from(*flag)).to_big_endian(),
            Value::FixedBytes(bytes) => bytes.to_fixed_bytes(),
        }
    }

    fn matches(&self, abi_type: &str) -> Result<bool, CalldataError> {
        Ok(match abi_type {
            "address" => matches!(self, Value::Address(_)),
            "bool" => matches!(self, Value::Bool(_)),
            "bytes32" => matches!(self, Value::FixedBytes(_)),
            uint if uint.starts_with("uint") => {
                let bits = match &uint[4..] {
                    "" => 256,
                    width => width
                        .parse::<usize>()
                        .ok()
                        .filter(|bits| *bits > 0 && *bits <= 256 && bits % 8 == 0)
                        .ok_or_else(|| CalldataError::UnsupportedType(uint.to_owned()))?,
                };
                matches!(self, Value::Uint(value) if value.bits() <= bits)
            }
            other => return Err(CalldataError::UnsupportedType(other.to_owned())),
        })
    }
}

pub fn function_selector(signature: &str) -> [u8; 4] {
    let canonical: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let hash = keccak(canonical.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash.as_bytes()[..4]);
    selector
}

fn parameter_types(signature: &str) -> Result<Vec<String>, CalldataError> {
    let canonical: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = canonical
        .split_once('(')
        .and_then(|(name, rest)| (!name.is_empty()).then_some(rest))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| CalldataError::InvalidSignature(signature.to_owned()))?;
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    Ok(inner.split(',').map(str::to_owned).collect())
}

fn check_arguments(
    signature: &str,
    types: &[String],
    values: &[Value],
) -> Result<(), CalldataError> {
    if types.len() != values.len() {
        return Err(CalldataError::WrongArgumentCount {
            signature: signature.to_owned(),
            expected: types.len(),
            got: values.len(),
        });
    }
    for (index, (abi_type, value)) in types.iter().zip(values).enumerate() {
        if !value.matches(abi_type)? {
            return Err(CalldataError::TypeMismatch {
                signature: signature.to_owned(),
                index,
                expected: abi_type.clone(),
            });
        }
    }
    Ok(())
}

/// Selector followed by the head-encoded arguments.
pub fn encode_calldata(signature: &str, values: &[Value]) -> Result<Vec<u8>, CalldataError> {
    let types = parameter_types(signature)?;
    check_arguments(signature, &types, values)?;

    let mut calldata = Vec::with_capacity(4 + 32 * values.len());
    calldata.extend_from_slice(&function_selector(signature));
    for value in values {
        calldata.extend_from_slice(&value.to_word());
    }
    Ok(calldata)
}

/// Encodes constructor arguments against a `constructor(...)` style signature;
/// the result is appended to the creation bytecode.
pub fn encode_constructor_args(
    signature: &str,
    values: &[Value],
) -> Result<Vec<u8>, CalldataError> {
    let types = parameter_types(signature)?;
    check_arguments(signature, &types, values)?;
    Ok(values.iter().flat_map(|value| value.to_word()).collect())
}

fn first_word(data: &[u8]) -> Result<[u8; 32], CalldataError> {
    let mut word = [0u8; 32];
    word.copy_from_slice(
        data.get(..32)
            .ok_or(CalldataError::ShortReturnData(data.len()))?,
    );
    Ok(word)
}

pub fn decode_uint(data: &[u8]) -> Result<U256, CalldataError> {
    Ok(U256::from_big_endian(&first_word(data)?))
}

pub fn decode_address(data: &[u8]) -> Result<Address, CalldataError> {
    let word = first_word(data)?;
    if word[..12].iter().any(|byte| *byte != 0) {
        return Err(CalldataError::DirtyAddressWord);
    }
    Ok(Address::from_slice(&word[12..]))
}
