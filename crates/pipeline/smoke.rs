//! Read-only checks against a freshly deployed contract.

use std::fmt;

use arbdeploy_common::{
    Address, U256,
    calldata::{decode_address, decode_uint, encode_calldata, function_selector},
    utils::to_checksum,
};
use tracing::{info, warn};

use crate::chain::ChainClient;

const PUSH4: u8 = 0x63;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokeCheck {
    /// Runtime code is non-empty at the address.
    CodePresent,
    /// The dispatcher pushes the function's selector.
    SelectorPresent { signature: &'static str },
    /// A zero-argument getter returns the expected address.
    ReadAddress {
        signature: &'static str,
        expected: Address,
    },
    /// A zero-argument getter returns the expected integer.
    ReadUint {
        signature: &'static str,
        expected: U256,
    },
}

impl fmt::Display for SmokeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmokeCheck::CodePresent => f.write_str("bytecode present"),
            SmokeCheck::SelectorPresent { signature } => write!(f, "selector of {signature}"),
            SmokeCheck::ReadAddress { signature, expected } => {
                write!(f, "{signature} == {}", to_checksum(expected))
            }
            SmokeCheck::ReadUint { signature, expected } => write!(f, "{signature} == {expected}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmokeOutcome {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
}

impl SmokeOutcome {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Whether `code` contains `PUSH4 <selector>`, the shape of a solc dispatcher entry.
pub fn code_has_selector(code: &[u8], selector: [u8; 4]) -> bool {
    code.windows(5)
        .any(|window| window[0] == PUSH4 && window[1..] == selector)
}

async fn run_check(
    chain: &dyn ChainClient,
    address: Address,
    check: &SmokeCheck,
    code: &mut Option<Vec<u8>>,
) -> Result<(), String> {
    let runtime_code = match code {
        Some(code) => code.clone(),
        None => {
            let fetched = chain
                .code_at(address)
                .await
                .map_err(|err| format!("eth_getCode failed: {err}"))?;
            *code = Some(fetched.clone());
            fetched
        }
    };

    match check {
        SmokeCheck::CodePresent if runtime_code.is_empty() => {
            Err("no bytecode at the deployed address".to_owned())
        }
        SmokeCheck::CodePresent => Ok(()),
        SmokeCheck::SelectorPresent { signature } => {
            if code_has_selector(&runtime_code, function_selector(signature)) {
                Ok(())
            } else {
                Err(format!("selector of {signature} not found in runtime code"))
            }
        }
        SmokeCheck::ReadAddress { signature, expected } => {
            let output = read(chain, address, signature).await?;
            let actual = decode_address(&output).map_err(|err| format!("{signature}: {err}"))?;
            if actual == *expected {
                Ok(())
            } else {
                Err(format!(
                    "{signature} returned {}, expected {}",
                    to_checksum(&actual),
                    to_checksum(expected)
                ))
            }
        }
        SmokeCheck::ReadUint { signature, expected } => {
            let output = read(chain, address, signature).await?;
            let actual = decode_uint(&output).map_err(|err| format!("{signature}: {err}"))?;
            if actual == *expected {
                Ok(())
            } else {
                Err(format!("{signature} returned {actual}, expected {expected}"))
            }
        }
    }
}

async fn read(chain: &dyn ChainClient, address: Address, signature: &str) -> Result<Vec<u8>, String> {
    let calldata = encode_calldata(signature, &[]).map_err(|err| err.to_string())?;
    chain
        .call(address, &calldata)
        .await
        .map_err(|err| format!("{signature} call failed: {err}"))
}

/// Runs every check; failures are collected, never fatal.
pub async fn smoke_test(chain: &dyn ChainClient, address: Address, checks: &[SmokeCheck]) -> SmokeOutcome {
    let mut outcome = SmokeOutcome::default();
    let mut code = None;
    for check in checks {
        match run_check(chain, address, check, &mut code).await {
            Ok(()) => {
                info!(check = %check, "Smoke check passed");
                outcome.passed.push(check.to_string());
            }
            Err(reason) => {
                warn!(check = %check, %reason, "Smoke check failed");
                outcome.failed.push(reason);
            }
        }
    }
    outcome
}
