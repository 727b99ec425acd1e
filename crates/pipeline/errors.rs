use arbdeploy_common::{
    Address, H256, U256, calldata::CalldataError, networks::NetworkError,
    types::DeploymentRecord,
};
use arbdeploy_registry::RegistryError;
use arbdeploy_rpc::EthClientError;

use crate::{artifacts::ArtifactError, orchestrator::Stage};

/// Failure reported by a [`crate::ChainClient`].
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Client(#[from] EthClientError),
    #[error("{0}")]
    Other(String),
}

/// How a failure should be handled by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input or environment; nothing was spent.
    Configuration,
    /// Funds or fee conditions; nothing was spent beyond queries.
    Resource,
    /// The deployment transaction failed or vanished; gas may be spent.
    OnChain,
    /// The registry could not be read before deploying; nothing was spent.
    Registry,
    /// Deployed, but the registry does not (yet) say so.
    Bookkeeping,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("failed to encode {0}")]
    Calldata(#[from] CalldataError),
    #[error("unknown contract type `{name}` (known: {known})")]
    UnknownContract { name: String, known: String },
    #[error(
        "RPC endpoint reports chain id {actual} but {network} is chain {expected}; check the RPC URL"
    )]
    ChainIdMismatch {
        network: String,
        expected: u64,
        actual: u64,
    },
    #[error(
        "{network} is a mainnet-class network: set ARBDEPLOY_CONFIRM={network} (or answer the prompt) to confirm this deployment"
    )]
    ConfirmationRequired { network: String },
    #[error(
        "{contract} is already deployed on {network} at {address:#x}; set ARBDEPLOY_ALLOW_REDEPLOY=true to deploy a new instance"
    )]
    AlreadyDeployed {
        network: String,
        contract: String,
        address: Address,
    },
    #[error(
        "{contract} on mainnet-class network {network} needs a non-zero minimum profit; set ARBDEPLOY_MIN_PROFIT to a wei amount"
    )]
    InvalidMinimumProfit { network: String, contract: String },
    #[error("deployer {deployer:#x} has no funds on {network}")]
    ZeroBalance { deployer: Address, network: String },
    #[error(
        "deployer {deployer:#x} cannot cover deployment: needs {needed} wei ({gas_limit} gas at {max_fee_per_gas} wei), has {available} wei"
    )]
    InsufficientFunds {
        deployer: Address,
        needed: U256,
        available: U256,
        gas_limit: u64,
        max_fee_per_gas: U256,
    },
    #[error("max fee per gas {max_fee_per_gas} wei exceeds the configured cap of {cap} wei; retry later or raise --max-fee-per-gas")]
    FeeTooHigh { max_fee_per_gas: U256, cap: U256 },
    #[error("gas estimation for {contract} failed: {source}")]
    GasEstimation {
        contract: String,
        #[source]
        source: ChainError,
    },
    #[error("{stage} stage RPC failure: {source}")]
    Chain {
        stage: Stage,
        #[source]
        source: ChainError,
    },
    #[error("deployment transaction {tx_hash:#x} reverted; inspect it on a block explorer")]
    Reverted { tx_hash: H256 },
    #[error(
        "deployment transaction {tx_hash:#x} was not mined within {waited_secs}s; check whether it is still pending before redeploying"
    )]
    NotMined { tx_hash: H256, waited_secs: u64 },
    #[error("receipt of deployment transaction {tx_hash:#x} carries no contract address")]
    MissingContractAddress { tx_hash: H256 },
    #[error("registry unavailable, nothing was deployed: {0}")]
    Registry(#[from] RegistryError),
    #[error(
        "{} deployed at {:#x} on {} but NOT recorded in the registry: {source}",
        .record.contract_name,
        .record.contract_address,
        .record.network
    )]
    Bookkeeping {
        record: Box<DeploymentRecord>,
        #[source]
        source: RegistryError,
    },
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Network(_)
            | PipelineError::Artifact(_)
            | PipelineError::Calldata(_)
            | PipelineError::UnknownContract { .. }
            | PipelineError::ChainIdMismatch { .. }
            | PipelineError::ConfirmationRequired { .. }
            | PipelineError::AlreadyDeployed { .. }
            | PipelineError::InvalidMinimumProfit { .. } => ErrorCategory::Configuration,
            PipelineError::ZeroBalance { .. }
            | PipelineError::InsufficientFunds { .. }
            | PipelineError::FeeTooHigh { .. }
            | PipelineError::GasEstimation { .. } => ErrorCategory::Resource,
            PipelineError::Chain { stage, .. } if *stage <= Stage::CostEstimated => {
                ErrorCategory::Resource
            }
            PipelineError::Chain { .. }
            | PipelineError::Reverted { .. }
            | PipelineError::NotMined { .. }
            | PipelineError::MissingContractAddress { .. } => ErrorCategory::OnChain,
            PipelineError::Registry(_) => ErrorCategory::Registry,
            PipelineError::Bookkeeping { .. } => ErrorCategory::Bookkeeping,
        }
    }

    /// Record that reached the chain but not the registry, if any.
    pub fn unrecorded_deployment(&self) -> Option<&DeploymentRecord> {
        match self {
            PipelineError::Bookkeeping { record, .. } => Some(record),
            _ => None,
        }
    }
}
