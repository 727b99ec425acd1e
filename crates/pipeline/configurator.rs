//! Post-deploy configuration: minimum-profit threshold and router approvals.

use std::time::Duration;

use arbdeploy_common::{
    Address, U256,
    calldata::{Value, encode_calldata},
    networks::Network,
    utils::to_checksum,
};
use tracing::{info, warn};

use crate::{
    chain::ChainClient,
    config::PipelineConfig,
    errors::PipelineError,
    preflight::check_minimum_profit_policy,
};

pub const SET_MIN_PROFIT: &str = "setMinProfit(uint256)";
pub const APPROVE_ROUTER: &str = "approveRouter(address)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterFailure {
    pub router: Address,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationOutcome {
    /// Threshold confirmed on chain; `None` if not set or the call failed.
    pub minimum_profit: Option<U256>,
    pub minimum_profit_error: Option<String>,
    pub approved_routers: Vec<Address>,
    pub failed_routers: Vec<RouterFailure>,
}

async fn transact(
    chain: &dyn ChainClient,
    contract: Address,
    calldata: &[u8],
    receipt_timeout: Duration,
) -> Result<(), String> {
    let tx_hash = chain
        .send_call(contract, calldata)
        .await
        .map_err(|err| err.to_string())?;
    let receipt = chain
        .wait_for_receipt(tx_hash, receipt_timeout)
        .await
        .map_err(|err| err.to_string())?;
    if receipt.status {
        Ok(())
    } else {
        Err(format!("transaction {tx_hash:#x} reverted"))
    }
}

/// Runs the configuration stages `config` declares.
///
/// The minimum-profit policy is re-checked before any transaction; past that
/// point every failure is recorded in the outcome instead of returned, and
/// each router approval is attempted regardless of the others.
pub async fn configure(
    chain: &dyn ChainClient,
    network: &Network,
    config: &PipelineConfig,
    contract: Address,
    minimum_profit: Option<U256>,
    routers: &[Address],
    receipt_timeout: Duration,
) -> Result<ConfigurationOutcome, PipelineError> {
    let mut outcome = ConfigurationOutcome::default();

    if config.stages.sets_minimum_profit() {
        check_minimum_profit_policy(network, config, minimum_profit)?;
        if let Some(threshold) = minimum_profit {
            let calldata = encode_calldata(SET_MIN_PROFIT, &[Value::Uint(threshold)])?;
            match transact(chain, contract, &calldata, receipt_timeout).await {
                Ok(()) => {
                    info!(contract = config.contract_name, %threshold, "Minimum profit set");
                    outcome.minimum_profit = Some(threshold);
                }
                Err(reason) => {
                    warn!(contract = config.contract_name, %reason, "Failed to set minimum profit");
                    outcome.minimum_profit_error = Some(reason);
                }
            }
        }
    }

    if config.stages.approves_routers() {
        for router in routers {
            let calldata = encode_calldata(APPROVE_ROUTER, &[Value::Address(*router)])?;
            match transact(chain, contract, &calldata, receipt_timeout).await {
                Ok(()) => {
                    info!(router = %to_checksum(router), "Router approved");
                    outcome.approved_routers.push(*router);
                }
                Err(reason) => {
                    warn!(router = %to_checksum(router), %reason, "Router approval failed");
                    outcome.failed_routers.push(RouterFailure {
                        router: *router,
                        reason,
                    });
                }
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use arbdeploy_common::{calldata::function_selector, networks::normalize_network};

    use super::*;
    use crate::{contracts, test_utils::RecordingChain};

    fn routers() -> Vec<Address> {
        vec![
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            Address::repeat_byte(0x33),
        ]
    }

    #[tokio::test]
    async fn mainnet_guard_fires_before_any_router_approval() {
        let chain = RecordingChain::new(1);
        let network = normalize_network("ethereum").expect("known network");
        let config = contracts::find("FlashLoanArbitrage").expect("catalogued");

        for minimum_profit in [None, Some(U256::zero())] {
            let err = configure(
                &chain,
                network,
                &config,
                Address::repeat_byte(0xc0),
                minimum_profit,
                &routers(),
                Duration::from_secs(1),
            )
            .await
            .expect_err("mainnet needs a positive threshold");

            assert!(matches!(err, PipelineError::InvalidMinimumProfit { .. }));
        }
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn router_failures_do_not_block_the_others() {
        let mut chain = RecordingChain::new(42161);
        chain.reverting = vec![Address::repeat_byte(0x22)];
        let network = normalize_network("arbitrum").expect("known network");
        let config = contracts::find("FlashLoanArbitrage").expect("catalogued");

        let outcome = configure(
            &chain,
            network,
            &config,
            Address::repeat_byte(0xc0),
            Some(U256::from(10u64)),
            &routers(),
            Duration::from_secs(1),
        )
        .await
        .expect("threshold is valid");

        let sent = chain.sent();
        assert_eq!(sent.len(), 4, "setMinProfit plus three approvals");
        assert!(sent[0].starts_with(&function_selector(SET_MIN_PROFIT)));
        assert_eq!(outcome.minimum_profit, Some(U256::from(10u64)));
        assert_eq!(
            outcome.approved_routers,
            vec![Address::repeat_byte(0x11), Address::repeat_byte(0x33)]
        );
        assert_eq!(outcome.failed_routers.len(), 1);
        assert_eq!(outcome.failed_routers[0].router, Address::repeat_byte(0x22));
        assert!(outcome.failed_routers[0].reason.ends_with("reverted"));
    }

    #[tokio::test]
    async fn contracts_without_configuration_send_nothing() {
        let chain = RecordingChain::new(1);
        let network = normalize_network("ethereum").expect("known network");
        let config = contracts::find("ProfitVault").expect("catalogued");

        let outcome = configure(
            &chain,
            network,
            &config,
            Address::repeat_byte(0xc0),
            None,
            &routers(),
            Duration::from_secs(1),
        )
        .await
        .expect("nothing to validate");

        assert_eq!(outcome, ConfigurationOutcome::default());
        assert!(chain.sent().is_empty());
    }
}
