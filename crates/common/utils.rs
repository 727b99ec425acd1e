use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("`{0}` is not a 0x-prefixed 20-byte hex address")]
    Malformed(String),
    #[error("`{0}` fails its EIP-55 checksum")]
    BadChecksum(String),
}

pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(&Keccak256::digest(data.as_ref()))
}

/// Renders an address in EIP-55 mixed-case form.
pub fn to_checksum(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = keccak(lower.as_bytes());
    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash.as_bytes()[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }
    checksummed
}

/// Parses a hex address. All-lowercase and all-uppercase inputs are accepted
/// as-is; mixed-case inputs must carry a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Result<Address, AddressError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| AddressError::Malformed(raw.to_owned()))?;
    if digits.len() != 40 {
        return Err(AddressError::Malformed(raw.to_owned()));
    }
    let bytes = hex::decode(digits).map_err(|_| AddressError::Malformed(raw.to_owned()))?;
    let address = Address::from_slice(&bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address)[2..] != *digits {
        return Err(AddressError::BadChecksum(raw.to_owned()));
    }
    Ok(address)
}

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Formats a wei amount as a decimal ether string (`2.0`, `0.02`).
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(WEI_PER_ETHER);
    let whole = wei / unit;
    let fraction = wei % unit;
    if fraction.is_zero() {
        return format!("{whole}.0");
    }
    let padded = format!("{:0>18}", fraction.to_string());
    format!("{whole}.{}", padded.trim_end_matches('0'))
}
