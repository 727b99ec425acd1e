use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arbdeploy_common::{Address, H256};
use arbdeploy_rpc::EthClientError;
use tracing::{info, warn};

use crate::{
    chain::ChainClient,
    errors::{ChainError, PipelineError},
    estimator::CostEstimate,
    orchestrator::Stage,
};

/// Receipt metadata of a mined deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub transaction_hash: H256,
    pub block_number: u64,
    pub gas_used: u64,
    pub timestamp: u64,
}

/// Broadcasts the creation transaction and waits for one confirmation.
/// Never retried: a second broadcast would be a second deployment.
pub async fn deploy(
    chain: &dyn ChainClient,
    contract: &str,
    creation_code: &[u8],
    estimate: &CostEstimate,
    receipt_timeout: Duration,
) -> Result<Deployment, PipelineError> {
    let tx_hash = chain
        .send_deploy(creation_code, estimate.gas_limit, estimate.fees)
        .await
        .map_err(|source| PipelineError::Chain {
            stage: Stage::Deployed,
            source,
        })?;
    info!(contract, tx_hash = %format!("{tx_hash:#x}"), "Deployment transaction sent");

    let receipt = match chain.wait_for_receipt(tx_hash, receipt_timeout).await {
        Ok(receipt) => receipt,
        Err(ChainError::Client(EthClientError::ReceiptTimeout { waited_secs, .. })) => {
            return Err(PipelineError::NotMined {
                tx_hash,
                waited_secs,
            });
        }
        Err(source) => {
            return Err(PipelineError::Chain {
                stage: Stage::Deployed,
                source,
            });
        }
    };
    if !receipt.status {
        return Err(PipelineError::Reverted { tx_hash });
    }
    let address = receipt
        .contract_address
        .filter(|address| !address.is_zero())
        .ok_or(PipelineError::MissingContractAddress { tx_hash })?;

    let timestamp = match chain.block_timestamp(receipt.block_number).await {
        Ok(timestamp) => timestamp,
        Err(err) => {
            warn!(%err, block = receipt.block_number, "Block timestamp unavailable, using local clock");
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default()
        }
    };

    info!(
        contract,
        address = %format!("{address:#x}"),
        block = receipt.block_number,
        gas_used = receipt.gas_used,
        "Contract deployed"
    );
    Ok(Deployment {
        address,
        transaction_hash: tx_hash,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
        timestamp,
    })
}
