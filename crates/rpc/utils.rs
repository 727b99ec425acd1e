use ethereum_types::{Address, H256, U256};
use serde_json::Value;

use crate::{errors::RpcError, types::Receipt};

fn as_hex_str<'a>(method: &str, field: &str, value: &'a Value) -> Result<&'a str, RpcError> {
    value
        .as_str()
        .ok_or_else(|| RpcError::parse(method, field, "expected hex string"))
}

pub(crate) fn hex_decode(method: &str, field: &str, raw: &str) -> Result<Vec<u8>, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|err| RpcError::parse(method, field, err))
}

pub(crate) fn parse_bytes(method: &str, field: &str, value: &Value) -> Result<Vec<u8>, RpcError> {
    hex_decode(method, field, as_hex_str(method, field, value)?)
}

pub(crate) fn parse_u64(method: &str, field: &str, value: &Value) -> Result<u64, RpcError> {
    let raw = as_hex_str(method, field, value)?;
    u64::from_str_radix(raw.strip_prefix("0x").unwrap_or(raw), 16)
        .map_err(|err| RpcError::parse(method, field, err))
}

pub(crate) fn parse_u256(method: &str, field: &str, value: &Value) -> Result<U256, RpcError> {
    let raw = as_hex_str(method, field, value)?;
    U256::from_str_radix(raw.strip_prefix("0x").unwrap_or(raw), 16)
        .map_err(|err| RpcError::parse(method, field, err))
}

pub(crate) fn parse_h256(method: &str, field: &str, value: &Value) -> Result<H256, RpcError> {
    let bytes = parse_bytes(method, field, value)?;
    if bytes.len() != 32 {
        return Err(RpcError::parse(
            method,
            field,
            format!("expected 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(H256::from_slice(&bytes))
}

pub(crate) fn parse_address(method: &str, field: &str, value: &Value) -> Result<Address, RpcError> {
    let bytes = parse_bytes(method, field, value)?;
    if bytes.len() != 20 {
        return Err(RpcError::parse(
            method,
            field,
            format!("expected 20 bytes, got {}", bytes.len()),
        ));
    }
    Ok(Address::from_slice(&bytes))
}

fn field<'a>(method: &str, value: &'a Value, name: &str) -> Result<&'a Value, RpcError> {
    value
        .get(name)
        .ok_or_else(|| RpcError::parse(method, name, "missing"))
}

/// `None` for a `null` result: the transaction is not mined yet.
pub(crate) fn parse_receipt(value: &Value) -> Result<Option<Receipt>, RpcError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    if value.is_null() {
        return Ok(None);
    }
    let contract_address = match value.get("contractAddress") {
        None | Some(Value::Null) => None,
        Some(address) => Some(parse_address(METHOD, "contractAddress", address)?),
    };
    // Pre-Byzantium receipts have `root` instead of `status`; treat as success.
    let status = match value.get("status") {
        None | Some(Value::Null) => true,
        Some(status) => parse_u64(METHOD, "status", status)? == 1,
    };
    Ok(Some(Receipt {
        transaction_hash: parse_h256(METHOD, "transactionHash", field(METHOD, value, "transactionHash")?)?,
        block_number: parse_u64(METHOD, "blockNumber", field(METHOD, value, "blockNumber")?)?,
        gas_used: parse_u64(METHOD, "gasUsed", field(METHOD, value, "gasUsed")?)?,
        status,
        contract_address,
    }))
}

pub(crate) fn parse_block_timestamp(value: &Value) -> Result<u64, RpcError> {
    const METHOD: &str = "eth_getBlockByNumber";
    if value.is_null() {
        return Err(RpcError::parse(METHOD, "result", "block not found"));
    }
    parse_u64(METHOD, "timestamp", field(METHOD, value, "timestamp")?)
}

pub(crate) fn parse_base_fee(value: &Value) -> Result<Option<U256>, RpcError> {
    const METHOD: &str = "eth_getBlockByNumber";
    match value.get("baseFeePerGas") {
        None | Some(Value::Null) => Ok(None),
        Some(fee) => parse_u256(METHOD, "baseFeePerGas", fee).map(Some),
    }
}
