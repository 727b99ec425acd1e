use arbdeploy_common::U256;
use arbdeploy_rpc::FeeData;
use tracing::info;

use crate::{
    chain::ChainClient, config::PipelineOptions, errors::PipelineError, orchestrator::Stage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    pub estimated_gas: u64,
    /// Estimate plus the configured buffer; used as the transaction gas limit.
    pub gas_limit: u64,
    pub fees: FeeData,
    pub max_cost: U256,
}

pub fn apply_buffer(estimated_gas: u64, buffer_percent: u64) -> u64 {
    estimated_gas.saturating_mul(100 + buffer_percent) / 100
}

pub async fn estimate_cost(
    chain: &dyn ChainClient,
    contract: &str,
    creation_code: &[u8],
    balance: U256,
    options: &PipelineOptions,
) -> Result<CostEstimate, PipelineError> {
    let estimated_gas = chain
        .estimate_deploy_gas(creation_code)
        .await
        .map_err(|source| PipelineError::GasEstimation {
            contract: contract.to_owned(),
            source,
        })?;
    let fees = chain.fee_data().await.map_err(|source| PipelineError::Chain {
        stage: Stage::CostEstimated,
        source,
    })?;

    if let Some(cap) = options.max_fee_per_gas_cap {
        if fees.max_fee_per_gas > cap {
            return Err(PipelineError::FeeTooHigh {
                max_fee_per_gas: fees.max_fee_per_gas,
                cap,
            });
        }
    }

    let gas_limit = apply_buffer(estimated_gas, options.gas_buffer_percent);
    let max_cost = fees.max_cost(gas_limit);
    if balance < max_cost {
        return Err(PipelineError::InsufficientFunds {
            deployer: chain.deployer(),
            needed: max_cost,
            available: balance,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
        });
    }

    info!(
        contract,
        estimated_gas,
        gas_limit,
        max_cost = %arbdeploy_common::utils::format_ether(max_cost),
        "Deployment cost estimated"
    );
    Ok(CostEstimate {
        estimated_gas,
        gas_limit,
        fees,
        max_cost,
    })
}
