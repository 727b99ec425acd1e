use arbdeploy_common::{U256, networks::Network};
use arbdeploy_registry::Registry;
use tracing::{info, warn};

use crate::{
    chain::ChainClient,
    config::{PipelineConfig, PipelineOptions},
    errors::PipelineError,
    orchestrator::Stage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub balance: U256,
    /// Whether a record existed and redeployment was explicitly allowed.
    pub redeploying: bool,
}

/// Rejects a mainnet-class run whose minimum profit is unset or zero.
pub fn check_minimum_profit_policy(
    network: &Network,
    config: &PipelineConfig,
    minimum_profit: Option<U256>,
) -> Result<(), PipelineError> {
    if !config.stages.sets_minimum_profit() || !network.mainnet_class {
        return Ok(());
    }
    match minimum_profit {
        Some(value) if !value.is_zero() => Ok(()),
        _ => Err(PipelineError::InvalidMinimumProfit {
            network: network.id.to_owned(),
            contract: config.contract_name.to_owned(),
        }),
    }
}

/// Everything that must hold before any gas is spent.
pub async fn preflight(
    chain: &dyn ChainClient,
    registry: &Registry,
    network: &'static Network,
    config: &PipelineConfig,
    options: &PipelineOptions,
) -> Result<PreflightReport, PipelineError> {
    let rpc = |source| PipelineError::Chain {
        stage: Stage::PreflightChecked,
        source,
    };

    let actual = chain.chain_id().await.map_err(rpc)?;
    if actual != network.chain_id {
        return Err(PipelineError::ChainIdMismatch {
            network: network.id.to_owned(),
            expected: network.chain_id,
            actual,
        });
    }

    if network.mainnet_class && !options.confirmation.confirms(network) {
        return Err(PipelineError::ConfirmationRequired {
            network: network.id.to_owned(),
        });
    }

    let mut redeploying = false;
    if let Some(existing) = registry.get(network.id, config.contract_name).await? {
        if !options.allow_redeploy {
            return Err(PipelineError::AlreadyDeployed {
                network: network.id.to_owned(),
                contract: config.contract_name.to_owned(),
                address: existing.contract_address,
            });
        }
        warn!(
            network = %network,
            contract = config.contract_name,
            existing = %format!("{:#x}", existing.contract_address),
            "Redeploying over an existing registry entry"
        );
        redeploying = true;
    }

    check_minimum_profit_policy(network, config, options.minimum_profit)?;

    let deployer = chain.deployer();
    let balance = chain.balance(deployer).await.map_err(rpc)?;
    if balance.is_zero() {
        return Err(PipelineError::ZeroBalance {
            deployer,
            network: network.id.to_owned(),
        });
    }

    info!(
        network = %network,
        contract = config.contract_name,
        deployer = %format!("{deployer:#x}"),
        balance = %arbdeploy_common::utils::format_ether(balance),
        "Preflight checks passed"
    );
    Ok(PreflightReport {
        balance,
        redeploying,
    })
}
