//! Deployable contract types.

use arbdeploy_common::{U256, calldata::Value, utils::to_checksum};
use serde_json::{Map, json};

use crate::{
    config::{DeployContext, PipelineConfig, PostDeployStages},
    errors::PipelineError,
    smoke::SmokeCheck,
};

pub const DEFAULT_REGISTRY_FILE: &str = "deployments.json";

fn flash_loan_constructor(ctx: &DeployContext) -> Result<Vec<Value>, PipelineError> {
    Ok(vec![
        Value::Address(ctx.addresses.require_aave_addresses_provider(ctx.network)?),
        Value::Address(ctx.addresses.require_balancer_vault(ctx.network)?),
    ])
}

fn flash_loan_smoke(ctx: &DeployContext) -> Vec<SmokeCheck> {
    let mut checks = vec![
        SmokeCheck::CodePresent,
        SmokeCheck::ReadAddress {
            signature: "owner()",
            expected: ctx.deployer,
        },
    ];
    if let Some(provider) = ctx.addresses.aave_addresses_provider {
        checks.push(SmokeCheck::ReadAddress {
            signature: "ADDRESSES_PROVIDER()",
            expected: provider,
        });
    }
    if let Some(vault) = ctx.addresses.balancer_vault {
        checks.push(SmokeCheck::ReadAddress {
            signature: "balancerVault()",
            expected: vault,
        });
    }
    checks
}

fn flash_loan_extras(ctx: &DeployContext) -> Map<String, serde_json::Value> {
    let mut extras = Map::new();
    if let Some(provider) = ctx.addresses.aave_addresses_provider {
        extras.insert("aaveAddressesProvider".into(), json!(to_checksum(&provider)));
    }
    if let Some(vault) = ctx.addresses.balancer_vault {
        extras.insert("balancerVault".into(), json!(to_checksum(&vault)));
    }
    extras
}

fn router_constructor(ctx: &DeployContext) -> Result<Vec<Value>, PipelineError> {
    Ok(vec![Value::Address(
        ctx.addresses.require_wrapped_native(ctx.network)?,
    )])
}

fn router_smoke(_ctx: &DeployContext) -> Vec<SmokeCheck> {
    vec![
        SmokeCheck::CodePresent,
        SmokeCheck::SelectorPresent {
            signature: "approveRouter(address)",
        },
        SmokeCheck::SelectorPresent {
            signature: "executeSwaps(bytes)",
        },
    ]
}

fn router_extras(ctx: &DeployContext) -> Map<String, serde_json::Value> {
    let mut extras = Map::new();
    if let Some(wrapped) = ctx.addresses.wrapped_native {
        extras.insert("wrappedNative".into(), json!(to_checksum(&wrapped)));
    }
    extras
}

fn vault_constructor(ctx: &DeployContext) -> Result<Vec<Value>, PipelineError> {
    Ok(vec![
        Value::Address(ctx.treasury.unwrap_or(ctx.deployer)),
        Value::Uint(U256::from(ctx.fee_bps)),
    ])
}

fn vault_smoke(ctx: &DeployContext) -> Vec<SmokeCheck> {
    vec![
        SmokeCheck::CodePresent,
        SmokeCheck::ReadAddress {
            signature: "treasury()",
            expected: ctx.treasury.unwrap_or(ctx.deployer),
        },
        SmokeCheck::ReadUint {
            signature: "feeBps()",
            expected: U256::from(ctx.fee_bps),
        },
    ]
}

fn vault_extras(ctx: &DeployContext) -> Map<String, serde_json::Value> {
    let mut extras = Map::new();
    extras.insert(
        "treasury".into(),
        json!(to_checksum(&ctx.treasury.unwrap_or(ctx.deployer))),
    );
    extras.insert("feeBps".into(), json!(ctx.fee_bps));
    extras
}

pub fn catalog() -> Vec<PipelineConfig> {
    vec![
        PipelineConfig {
            contract_name: "FlashLoanArbitrage",
            registry_file: DEFAULT_REGISTRY_FILE,
            constructor_signature: "constructor(address,address)",
            constructor_args: flash_loan_constructor,
            stages: PostDeployStages::MinimumProfitAndRouters,
            smoke: flash_loan_smoke,
            extras: flash_loan_extras,
        },
        PipelineConfig {
            contract_name: "MultiDexRouter",
            registry_file: DEFAULT_REGISTRY_FILE,
            constructor_signature: "constructor(address)",
            constructor_args: router_constructor,
            stages: PostDeployStages::RouterApproval,
            smoke: router_smoke,
            extras: router_extras,
        },
        PipelineConfig {
            contract_name: "ProfitVault",
            registry_file: DEFAULT_REGISTRY_FILE,
            constructor_signature: "constructor(address,uint16)",
            constructor_args: vault_constructor,
            stages: PostDeployStages::None,
            smoke: vault_smoke,
            extras: vault_extras,
        },
    ]
}

/// Case-insensitive lookup by contract name.
pub fn find(name: &str) -> Result<PipelineConfig, PipelineError> {
    let configs = catalog();
    let known = configs
        .iter()
        .map(|config| config.contract_name)
        .collect::<Vec<_>>()
        .join(", ");
    configs
        .into_iter()
        .find(|config| config.contract_name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| PipelineError::UnknownContract {
            name: name.to_owned(),
            known,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbdeploy_common::{
        Address,
        calldata::encode_constructor_args,
        networks::{normalize_network, protocol_addresses},
    };

    fn context(network: &str) -> DeployContext {
        let network = normalize_network(network).expect("known network");
        DeployContext {
            network,
            deployer: Address::repeat_byte(0xde),
            addresses: protocol_addresses(network),
            treasury: None,
            fee_bps: 250,
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(find("flashloanarbitrage").map(|c| c.contract_name).ok(), Some("FlashLoanArbitrage"));
        assert!(matches!(find("Nope"), Err(PipelineError::UnknownContract { .. })));
    }

    #[test]
    fn constructor_args_match_their_signatures() {
        let ctx = context("arbitrum");
        for config in catalog() {
            let args = (config.constructor_args)(&ctx).expect("arbitrum has every address");
            let encoded = encode_constructor_args(config.constructor_signature, &args)
                .expect("arguments match the constructor");
            assert_eq!(encoded.len(), 32 * args.len());
        }
    }

    #[test]
    fn missing_protocol_address_is_a_configuration_error() {
        let config = find("FlashLoanArbitrage").expect("in catalog");
        let err = (config.constructor_args)(&context("bsc")).expect_err("bsc lacks Aave");
        assert_eq!(err.category(), crate::errors::ErrorCategory::Configuration);
        assert!(err.to_string().contains("bsc"));
    }

    #[test]
    fn vault_defaults_treasury_to_deployer() {
        let ctx = context("sepolia");
        let config = find("ProfitVault").expect("in catalog");
        assert_eq!(
            (config.constructor_args)(&ctx).expect("no addresses needed"),
            vec![Value::Address(ctx.deployer), Value::Uint(U256::from(250))]
        );
        assert_eq!((config.extras)(&ctx)["feeBps"], json!(250));
    }
}
