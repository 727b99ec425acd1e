use std::time::Duration;

use arbdeploy_common::{
    Address, U256,
    calldata::Value,
    networks::{Network, ProtocolAddresses},
};
use serde_json::Map;

use crate::{errors::PipelineError, smoke::SmokeCheck, verification::RetryPolicy};

/// Optional post-deploy stages a contract type runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostDeployStages {
    None,
    RouterApproval,
    MinimumProfitAndRouters,
}

impl PostDeployStages {
    pub fn sets_minimum_profit(self) -> bool {
        matches!(self, PostDeployStages::MinimumProfitAndRouters)
    }

    pub fn approves_routers(self) -> bool {
        matches!(
            self,
            PostDeployStages::RouterApproval | PostDeployStages::MinimumProfitAndRouters
        )
    }
}

/// What the per-contract builders see when deriving constructor arguments,
/// smoke checks and record extras.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub network: &'static Network,
    pub deployer: Address,
    /// Address book with operator overrides applied.
    pub addresses: ProtocolAddresses,
    pub treasury: Option<Address>,
    pub fee_bps: u16,
}

pub type ConstructorBuilder = fn(&DeployContext) -> Result<Vec<Value>, PipelineError>;
pub type SmokeProfile = fn(&DeployContext) -> Vec<SmokeCheck>;
pub type ExtrasBuilder = fn(&DeployContext) -> Map<String, serde_json::Value>;

/// Declarative description of one deployable contract type.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub contract_name: &'static str,
    /// File name of the registry this contract type is recorded in.
    pub registry_file: &'static str,
    /// ABI signature of the constructor, e.g. `constructor(address,address)`.
    pub constructor_signature: &'static str,
    pub constructor_args: ConstructorBuilder,
    pub stages: PostDeployStages,
    pub smoke: SmokeProfile,
    pub extras: ExtrasBuilder,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Confirmation {
    #[default]
    None,
    /// Must equal the canonical network id on mainnet-class networks.
    Token(String),
}

impl Confirmation {
    pub fn confirms(&self, network: &Network) -> bool {
        match self {
            Confirmation::None => false,
            Confirmation::Token(token) => token.trim().eq_ignore_ascii_case(network.id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressOverrides {
    pub aave_addresses_provider: Option<Address>,
    pub balancer_vault: Option<Address>,
    pub wrapped_native: Option<Address>,
}

impl AddressOverrides {
    pub fn apply(&self, mut book: ProtocolAddresses) -> ProtocolAddresses {
        if let Some(address) = self.aave_addresses_provider {
            book.aave_addresses_provider = Some(address);
        }
        if let Some(address) = self.balancer_vault {
            book.balancer_vault = Some(address);
        }
        if let Some(address) = self.wrapped_native {
            book.wrapped_native = Some(address);
        }
        book
    }
}

/// Operator-supplied knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub confirmation: Confirmation,
    pub minimum_profit: Option<U256>,
    /// Routers to approve; `None` uses the network's address book.
    pub routers: Option<Vec<Address>>,
    pub overrides: AddressOverrides,
    pub treasury: Option<Address>,
    pub fee_bps: u16,
    pub allow_redeploy: bool,
    /// Extra gas on top of `eth_estimateGas` for the deployment, in percent.
    pub gas_buffer_percent: u64,
    pub max_fee_per_gas_cap: Option<U256>,
    pub receipt_timeout: Duration,
    pub verification_retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            confirmation: Confirmation::None,
            minimum_profit: None,
            routers: None,
            overrides: AddressOverrides::default(),
            treasury: None,
            fee_bps: 500,
            allow_redeploy: false,
            gas_buffer_percent: 20,
            max_fee_per_gas_cap: None,
            receipt_timeout: Duration::from_secs(300),
            verification_retry: RetryPolicy::default(),
        }
    }
}
