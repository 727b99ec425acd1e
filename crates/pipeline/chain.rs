use std::time::Duration;

use arbdeploy_common::{Address, H256, U256};
use arbdeploy_rpc::{
    BlockTag, CallRequest, Eip1559Transaction, EthClient, FeeData, LocalSigner, Receipt,
};
use tracing::debug;

use crate::errors::ChainError;

/// Everything the pipeline needs from the target chain.
///
/// Implementations sign with the deployer key; read-only calls are issued
/// from the deployer address as well.
// We need async_trait because the stabilized feature lacks support for object safety
// (i.e. dyn ChainClient)
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    fn deployer(&self) -> Address;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Current fee parameters, never cached between calls.
    async fn fee_data(&self) -> Result<FeeData, ChainError>;

    async fn estimate_deploy_gas(&self, creation_code: &[u8]) -> Result<u64, ChainError>;

    /// Signs and broadcasts a contract-creation transaction.
    async fn send_deploy(
        &self,
        creation_code: &[u8],
        gas_limit: u64,
        fees: FeeData,
    ) -> Result<H256, ChainError>;

    /// Signs and broadcasts a call to `to`, estimating gas and fees itself.
    async fn send_call(&self, to: Address, calldata: &[u8]) -> Result<H256, ChainError>;

    async fn wait_for_receipt(&self, tx_hash: H256, max_wait: Duration) -> Result<Receipt, ChainError>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;

    async fn call(&self, to: Address, calldata: &[u8]) -> Result<Vec<u8>, ChainError>;

    async fn code_at(&self, address: Address) -> Result<Vec<u8>, ChainError>;
}

/// [`ChainClient`] over JSON-RPC with a local deployer key.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: EthClient,
    signer: LocalSigner,
    chain_id: u64,
    /// Percentage added to `eth_estimateGas` for configuration calls.
    call_gas_buffer_percent: u64,
}

impl RpcChainClient {
    pub async fn connect(client: EthClient, signer: LocalSigner) -> Result<Self, ChainError> {
        let chain_id = client.chain_id().await?;
        Ok(Self {
            client,
            signer,
            chain_id,
            call_gas_buffer_percent: 20,
        })
    }

    async fn sign_and_send(&self, tx: Eip1559Transaction) -> Result<H256, ChainError> {
        let signed = self.signer.sign_eip1559(&tx);
        let tx_hash = self.client.send_raw_transaction(&signed.raw).await?;
        if tx_hash != signed.hash {
            debug!(
                local = %format!("{:#x}", signed.hash),
                node = %format!("{tx_hash:#x}"),
                "Node returned a different transaction hash"
            );
        }
        Ok(tx_hash)
    }
}

#[async_trait::async_trait]
impl ChainClient for RpcChainClient {
    fn deployer(&self) -> Address {
        self.signer.address()
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.client.chain_id().await?)
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.client.get_balance(address, BlockTag::Latest).await?)
    }

    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        let base_fee = self.client.base_fee().await?;
        let tip = self.client.max_priority_fee_per_gas().await?;
        Ok(FeeData::new(base_fee, tip))
    }

    async fn estimate_deploy_gas(&self, creation_code: &[u8]) -> Result<u64, ChainError> {
        let request = CallRequest {
            from: Some(self.deployer()),
            to: None,
            data: creation_code.to_vec(),
            value: U256::zero(),
        };
        Ok(self.client.estimate_gas(&request).await?)
    }

    async fn send_deploy(
        &self,
        creation_code: &[u8],
        gas_limit: u64,
        fees: FeeData,
    ) -> Result<H256, ChainError> {
        let nonce = self.client.get_nonce(self.deployer(), BlockTag::Pending).await?;
        self.sign_and_send(Eip1559Transaction {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit,
            to: None,
            value: U256::zero(),
            data: creation_code.to_vec(),
        })
        .await
    }

    async fn send_call(&self, to: Address, calldata: &[u8]) -> Result<H256, ChainError> {
        let request = CallRequest {
            from: Some(self.deployer()),
            to: Some(to),
            data: calldata.to_vec(),
            value: U256::zero(),
        };
        let estimate = self.client.estimate_gas(&request).await?;
        let gas_limit = estimate.saturating_mul(100 + self.call_gas_buffer_percent) / 100;
        let fees = self.fee_data().await?;
        let nonce = self.client.get_nonce(self.deployer(), BlockTag::Pending).await?;
        self.sign_and_send(Eip1559Transaction {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit,
            to: Some(to),
            value: U256::zero(),
            data: request.data,
        })
        .await
    }

    async fn wait_for_receipt(&self, tx_hash: H256, max_wait: Duration) -> Result<Receipt, ChainError> {
        Ok(self.client.wait_for_transaction_receipt(tx_hash, max_wait).await?)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        Ok(self
            .client
            .get_block_timestamp(BlockTag::Number(block_number))
            .await?)
    }

    async fn call(&self, to: Address, calldata: &[u8]) -> Result<Vec<u8>, ChainError> {
        let request = CallRequest {
            from: Some(self.deployer()),
            to: Some(to),
            data: calldata.to_vec(),
            value: U256::zero(),
        };
        Ok(self.client.call(&request, BlockTag::Latest).await?)
    }

    async fn code_at(&self, address: Address) -> Result<Vec<u8>, ChainError> {
        Ok(self.client.get_code(address, BlockTag::Latest).await?)
    }
}
