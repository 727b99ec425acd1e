//! Operator-facing summary and follow-up commands.
//!
//! Everything here is pure formatting over values the pipeline already
//! produced, so the same helpers serve `deploy`, `batch` and `status`.

use std::{fmt::Write, path::Path};

use arbdeploy_common::{
    Address,
    calldata::Value,
    networks::Network,
    types::DeploymentRecord,
    utils::{format_ether, to_checksum},
};

use crate::{
    artifacts::ArtifactLayout,
    configurator::{APPROVE_ROUTER, SET_MIN_PROFIT},
    orchestrator::PipelineReport,
    verification::VerificationStatus,
};

fn render_value(value: &Value) -> String {
    match value {
        Value::Address(address) => to_checksum(address),
        Value::Uint(value) => value.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::FixedBytes(bytes) => format!("{bytes:#x}"),
    }
}

/// Command that submits source verification by hand.
pub fn verify_command(
    network: &Network,
    layout: ArtifactLayout,
    record: &DeploymentRecord,
    constructor_args: &[Value],
) -> String {
    let address = to_checksum(&record.contract_address);
    match layout {
        ArtifactLayout::Hardhat => {
            let mut command = format!("npx hardhat verify --network {} {address}", network.id);
            for arg in constructor_args {
                let _ = write!(command, " {}", render_value(arg));
            }
            command
        }
        ArtifactLayout::Foundry => {
            let args = constructor_args
                .iter()
                .map(render_value)
                .collect::<Vec<_>>()
                .join(" ");
            let mut command = format!(
                "forge verify-contract --chain {} --watch {address} {}",
                network.chain_id, record.contract_name
            );
            if !constructor_args.is_empty() {
                let _ = write!(command, " --constructor-args $(cast abi-encode \"constructor(");
                let types = constructor_args
                    .iter()
                    .map(|arg| match arg {
                        Value::Address(_) => "address",
                        Value::Uint(_) => "uint256",
                        Value::Bool(_) => "bool",
                        Value::FixedBytes(_) => "bytes32",
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                let _ = write!(command, "{types})\" {args})");
            }
            command
        }
    }
}

/// `cast` invocation approving one router on a deployed contract.
pub fn approve_router_command(network: &Network, contract: Address, router: Address) -> String {
    format!(
        "cast send {} \"{APPROVE_ROUTER}\" {} --rpc-url ${} --private-key $ARBDEPLOY_PRIVATE_KEY",
        to_checksum(&contract),
        to_checksum(&router),
        network.rpc_url_env_key()
    )
}

pub fn set_min_profit_command(network: &Network, contract: Address, minimum_profit: &str) -> String {
    format!(
        "cast send {} \"{SET_MIN_PROFIT}\" {minimum_profit} --rpc-url ${} --private-key $ARBDEPLOY_PRIVATE_KEY",
        to_checksum(&contract),
        network.rpc_url_env_key()
    )
}

/// Command that writes a pending record into the registry by hand.
pub fn registry_fix_command(
    registry: &Path,
    record_file: &Path,
    network: &str,
    contract: &str,
) -> String {
    format!(
        "arbdeploy registry set --registry {} --network {network} --contract {contract} --record {}",
        registry.display(),
        record_file.display()
    )
}

fn contract_steps(record: &DeploymentRecord) -> Vec<String> {
    let address = to_checksum(&record.contract_address);
    match record.contract_name.as_str() {
        "FlashLoanArbitrage" => vec![
            format!("Set ARBITRAGE_CONTRACT={address} in the bot environment"),
            "Run the bot in simulation mode before enabling live execution".to_owned(),
        ],
        "MultiDexRouter" => vec![
            format!("Set MULTI_DEX_ROUTER={address} in the bot environment"),
            format!("Approve {address} on FlashLoanArbitrage if it should route through it"),
        ],
        "ProfitVault" => vec![format!(
            "Point FlashLoanArbitrage profit withdrawals at {address}"
        )],
        _ => Vec::new(),
    }
}

/// Follow-ups derived from a stored record alone.
pub fn next_steps(
    record: &DeploymentRecord,
    network: &Network,
    layout: ArtifactLayout,
    constructor_args: &[Value],
) -> Vec<String> {
    let mut steps = Vec::new();
    if !record.verified && network.explorer_supported {
        steps.push(format!(
            "Verify the source: {}",
            verify_command(network, layout, record, constructor_args)
        ));
    }
    for router in &record.failed_routers {
        steps.push(format!(
            "Approve router manually: {}",
            approve_router_command(network, record.contract_address, *router)
        ));
    }
    if record.needs_investigation() {
        steps.push(format!(
            "Inspect {} on chain: smoke tests failed",
            to_checksum(&record.contract_address)
        ));
    }
    steps.extend(contract_steps(record));
    steps
}

pub fn render(report: &PipelineReport) -> String {
    let record = &report.record;
    let mut out = String::new();
    let _ = writeln!(out, "{} deployed on {}", record.contract_name, report.network);
    let _ = writeln!(out, "  address:      {}", to_checksum(&record.contract_address));
    let _ = writeln!(out, "  deployer:     {}", to_checksum(&record.deployer_address));
    let _ = writeln!(out, "  transaction:  {:#x}", record.transaction_hash);
    let _ = writeln!(out, "  block:        {}", record.block_number);
    if let Some(gas_used) = record.gas_used {
        let _ = writeln!(
            out,
            "  gas used:     {gas_used} (limit {}, max cost {} {})",
            report.estimate.gas_limit,
            format_ether(report.estimate.max_cost),
            report.network.native_symbol
        );
    }
    if let Some(minimum_profit) = record.minimum_profit {
        let _ = writeln!(out, "  min profit:   {minimum_profit} wei");
    }
    if !record.approved_routers.is_empty() || !record.failed_routers.is_empty() {
        let _ = writeln!(
            out,
            "  routers:      {} approved, {} failed",
            record.approved_routers.len(),
            record.failed_routers.len()
        );
    }
    let verification = match &report.verification.status {
        VerificationStatus::Verified => "verified".to_owned(),
        VerificationStatus::AlreadyVerified => "already verified".to_owned(),
        VerificationStatus::Skipped(reason) => format!("skipped ({reason})"),
        VerificationStatus::Failed(reason) => format!(
            "FAILED after {} attempts ({reason})",
            report.verification.attempts
        ),
    };
    let _ = writeln!(out, "  verification: {verification}");
    let _ = writeln!(
        out,
        "  smoke tests:  {} passed, {} failed",
        report.smoke.passed.len(),
        report.smoke.failed.len()
    );
    let _ = writeln!(out, "  status:       {}", status_label(record));

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "\nWarnings:");
        for warning in &report.warnings {
            let _ = writeln!(out, "  [{}] {}", warning.stage, warning.message);
        }
    }

    let steps = next_steps(record, report.network, report.layout, &report.constructor_args);
    if !steps.is_empty() {
        let _ = writeln!(out, "\nNext steps:");
        for (index, step) in steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {step}", index + 1);
        }
    }
    out
}

pub fn status_label(record: &DeploymentRecord) -> &'static str {
    if record.needs_investigation() {
        "needs investigation"
    } else {
        "deployed"
    }
}
