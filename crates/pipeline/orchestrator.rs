//! Stage sequencing for one `(contract type, network)` deployment.

use std::{fmt, sync::Arc};

use arbdeploy_common::{
    calldata::{Value, encode_constructor_args},
    networks::{Network, protocol_addresses},
    types::{DeploymentRecord, DeploymentStatus},
    utils::to_checksum,
};
use arbdeploy_registry::Registry;
use tracing::{error, info, warn};

use crate::{
    artifacts::{ArtifactLayout, ContractArtifact},
    chain::ChainClient,
    config::{DeployContext, PipelineConfig, PipelineOptions},
    configurator::{ConfigurationOutcome, configure},
    errors::PipelineError,
    estimator::{CostEstimate, estimate_cost},
    executor::deploy,
    preflight::preflight,
    smoke::{SmokeOutcome, smoke_test},
    summary::{approve_router_command, set_min_profit_command},
    verification::{
        VerificationJob, VerificationReport, VerificationStatus, Verifier, verify_with_retry,
    },
};

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle,
    PreflightChecked,
    CostEstimated,
    Deployed,
    Configured,
    Verified,
    SmokeTested,
    Recorded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::PreflightChecked => "preflight",
            Stage::CostEstimated => "estimate",
            Stage::Deployed => "deploy",
            Stage::Configured => "configure",
            Stage::Verified => "verify",
            Stage::SmokeTested => "smoke-test",
            Stage::Recorded => "record",
        };
        f.write_str(name)
    }
}

/// Non-fatal degradation raised by a post-deploy stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub stage: Stage,
    pub message: String,
    /// Command that repairs the degradation by hand, when one exists.
    pub remediation: Option<String>,
}

impl Warning {
    fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            remediation: None,
        }
    }

    fn with_remediation(mut self, command: String) -> Self {
        self.remediation = Some(command);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub network: &'static Network,
    /// Record as written to the registry.
    pub record: DeploymentRecord,
    pub layout: ArtifactLayout,
    pub constructor_args: Vec<Value>,
    pub estimate: CostEstimate,
    pub configuration: ConfigurationOutcome,
    pub verification: VerificationReport,
    pub smoke: SmokeOutcome,
    pub warnings: Vec<Warning>,
    /// Entry the registry held before this run overwrote it.
    pub replaced: Option<DeploymentRecord>,
}

/// Runs deployments of any catalogued contract type against one network.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<dyn ChainClient>,
    verifier: Arc<dyn Verifier>,
    registry: Registry,
    network: &'static Network,
    options: PipelineOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("network", &self.network.id)
            .field("deployer", &self.chain.deployer())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        verifier: Arc<dyn Verifier>,
        registry: Registry,
        network: &'static Network,
        options: PipelineOptions,
    ) -> Self {
        Self {
            chain,
            verifier,
            registry,
            network,
            options,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn context(&self) -> DeployContext {
        DeployContext {
            network: self.network,
            deployer: self.chain.deployer(),
            addresses: self.options.overrides.apply(protocol_addresses(self.network)),
            treasury: self.options.treasury,
            fee_bps: self.options.fee_bps,
        }
    }

    /// Drives `artifact` through every stage.
    ///
    /// Failures up to and including [`Stage::Deployed`] abort the run before
    /// anything is recorded. Later stages only add [`Warning`]s; the record is
    /// always written once the contract exists on chain.
    pub async fn run(
        &self,
        config: &PipelineConfig,
        artifact: &ContractArtifact,
    ) -> Result<PipelineReport, PipelineError> {
        let chain = self.chain.as_ref();
        let network = self.network;
        let contract = config.contract_name;
        let ctx = self.context();

        let constructor_args = (config.constructor_args)(&ctx)?;
        let encoded_args = encode_constructor_args(config.constructor_signature, &constructor_args)?;
        let mut creation_code = artifact.bytecode.clone();
        creation_code.extend_from_slice(&encoded_args);
        info!(%network, contract, layout = %artifact.layout, "Starting deployment pipeline");

        let checked = preflight(chain, &self.registry, network, config, &self.options).await?;
        stage_reached(network, contract, Stage::PreflightChecked);

        let estimate =
            estimate_cost(chain, contract, &creation_code, checked.balance, &self.options).await?;
        stage_reached(network, contract, Stage::CostEstimated);

        let deployment = deploy(
            chain,
            contract,
            &creation_code,
            &estimate,
            self.options.receipt_timeout,
        )
        .await?;
        stage_reached(network, contract, Stage::Deployed);

        let mut warnings = Vec::new();
        let address = deployment.address;

        let routers = self
            .options
            .routers
            .clone()
            .unwrap_or_else(|| ctx.addresses.router_addresses());
        let configured = configure(
            chain,
            network,
            config,
            address,
            self.options.minimum_profit,
            &routers,
            self.options.receipt_timeout,
        )
        .await;
        let configuration = match configuration_or_warning(configured, &mut warnings) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    %network,
                    contract,
                    address = %to_checksum(&address),
                    tx_hash = %format!("{:#x}", deployment.transaction_hash),
                    "Configuration refused; the contract is deployed but left unconfigured and unrecorded"
                );
                return Err(err);
            }
        };
        if let Some(reason) = &configuration.minimum_profit_error {
            let value = self
                .options
                .minimum_profit
                .map(|value| value.to_string())
                .unwrap_or_default();
            warnings.push(
                Warning::new(
                    Stage::Configured,
                    format!("minimum profit was not set: {reason}"),
                )
                .with_remediation(set_min_profit_command(network, address, &value)),
            );
        }
        for failure in &configuration.failed_routers {
            warnings.push(
                Warning::new(
                    Stage::Configured,
                    format!(
                        "router {} was not approved: {}",
                        to_checksum(&failure.router),
                        failure.reason
                    ),
                )
                .with_remediation(approve_router_command(network, address, failure.router)),
            );
        }
        stage_reached(network, contract, Stage::Configured);

        let job = VerificationJob {
            network,
            address,
            contract_name: contract.to_owned(),
            constructor_args: encoded_args,
            source: artifact.verification.clone(),
        };
        let verification =
            verify_with_retry(self.verifier.as_ref(), &job, &self.options.verification_retry).await;
        if let VerificationStatus::Failed(reason) = &verification.status {
            warnings.push(Warning::new(
                Stage::Verified,
                format!(
                    "source verification failed after {} attempts: {reason}",
                    verification.attempts
                ),
            ));
        }
        stage_reached(network, contract, Stage::Verified);

        let checks = (config.smoke)(&ctx);
        let smoke = smoke_test(chain, address, &checks).await;
        if !smoke.all_passed() {
            warnings.push(Warning::new(
                Stage::SmokeTested,
                format!("smoke tests failed: {}", smoke.failed.join("; ")),
            ));
        }
        stage_reached(network, contract, Stage::SmokeTested);

        let record = DeploymentRecord {
            network: network.id.to_owned(),
            chain_id: network.chain_id,
            contract_name: contract.to_owned(),
            contract_address: address,
            deployer_address: ctx.deployer,
            transaction_hash: deployment.transaction_hash,
            block_number: deployment.block_number,
            timestamp: deployment.timestamp,
            verified: verification.verified(),
            gas_used: Some(deployment.gas_used),
            approved_routers: configuration.approved_routers.clone(),
            failed_routers: configuration
                .failed_routers
                .iter()
                .map(|failure| failure.router)
                .collect(),
            minimum_profit: configuration.minimum_profit,
            smoke_test_passed: Some(smoke.all_passed()),
            status: if smoke.all_passed() {
                DeploymentStatus::Deployed
            } else {
                DeploymentStatus::NeedsInvestigation
            },
            warnings: warnings.iter().map(|warning| warning.message.clone()).collect(),
            extra: (config.extras)(&ctx),
        };

        let replaced = match self.registry.update(network.id, contract, record.clone()).await {
            Ok(replaced) => replaced,
            Err(source) => {
                error!(
                    %network,
                    contract,
                    address = %to_checksum(&address),
                    tx_hash = %format!("{:#x}", record.transaction_hash),
                    "Contract is deployed but NOT recorded; record it manually before redeploying"
                );
                return Err(PipelineError::Bookkeeping {
                    record: Box::new(record),
                    source,
                });
            }
        };
        if let Some(previous) = &replaced {
            if !checked.redeploying {
                // Another run recorded this pair after our preflight read.
                error!(
                    %network,
                    contract,
                    previous = %to_checksum(&previous.contract_address),
                    current = %to_checksum(&address),
                    "Concurrent deployment detected; the previous registry entry was overwritten"
                );
                let warning = Warning::new(
                    Stage::Recorded,
                    format!(
                        "a concurrent run recorded {} at {} while this run deployed; that entry was overwritten",
                        contract,
                        to_checksum(&previous.contract_address)
                    ),
                );
                warnings.push(warning);
            }
        }
        stage_reached(network, contract, Stage::Recorded);

        for warning in &warnings {
            warn!(
                %network,
                contract,
                stage = %warning.stage,
                remediation = warning.remediation.as_deref().unwrap_or("-"),
                "{}",
                warning.message
            );
        }

        Ok(PipelineReport {
            network,
            record,
            layout: artifact.layout,
            constructor_args,
            estimate,
            configuration,
            verification,
            smoke,
            warnings,
            replaced,
        })
    }
}

/// A policy violation stays fatal; any other configuration error becomes a
/// warning and an empty outcome.
fn configuration_or_warning(
    configured: Result<ConfigurationOutcome, PipelineError>,
    warnings: &mut Vec<Warning>,
) -> Result<ConfigurationOutcome, PipelineError> {
    match configured {
        Ok(outcome) => Ok(outcome),
        Err(err @ PipelineError::InvalidMinimumProfit { .. }) => Err(err),
        Err(err) => {
            warnings.push(Warning::new(
                Stage::Configured,
                format!("configuration skipped: {err}"),
            ));
            Ok(ConfigurationOutcome::default())
        }
    }
}

fn stage_reached(network: &Network, contract: &str, stage: Stage) {
    info!(%network, contract, %stage, "Stage complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Idle < Stage::PreflightChecked);
        assert!(Stage::Deployed < Stage::Configured);
        assert!(Stage::SmokeTested < Stage::Recorded);
        assert_eq!(Stage::SmokeTested.to_string(), "smoke-test");
    }

    #[test]
    fn minimum_profit_violation_is_not_downgraded() {
        let mut warnings = Vec::new();
        let err = configuration_or_warning(
            Err(PipelineError::InvalidMinimumProfit {
                network: "ethereum".to_owned(),
                contract: "FlashLoanArbitrage".to_owned(),
            }),
            &mut warnings,
        )
        .expect_err("policy violation stays fatal");

        assert!(matches!(err, PipelineError::InvalidMinimumProfit { .. }));
        assert!(warnings.is_empty());
    }

    #[test]
    fn other_configuration_errors_become_warnings() {
        let mut warnings = Vec::new();
        let outcome = configuration_or_warning(
            Err(PipelineError::UnknownContract {
                name: "Nope".to_owned(),
                known: String::new(),
            }),
            &mut warnings,
        )
        .expect("downgraded");

        assert_eq!(outcome, ConfigurationOutcome::default());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].stage, Stage::Configured);
        assert!(warnings[0].message.starts_with("configuration skipped"));
    }
}
