use std::{sync::Mutex, time::Duration};

use arbdeploy_common::{Address, H256, U256};
use arbdeploy_rpc::{FeeData, Receipt};

use crate::{chain::ChainClient, errors::ChainError};

/// Chain stand-in that records every call transaction.
///
/// Transactions whose calldata ends with an address in `reverting` mine with
/// a failed status; deployments are refused.
pub struct RecordingChain {
    pub chain_id: u64,
    pub balance: U256,
    pub reverting: Vec<Address>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            balance: U256::exp10(18),
            reverting: Vec::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait::async_trait]
impl ChainClient for RecordingChain {
    fn deployer(&self) -> Address {
        Address::repeat_byte(0xde)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(self.balance)
    }

    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        Ok(FeeData::new(U256::one(), U256::one()))
    }

    async fn estimate_deploy_gas(&self, _creation_code: &[u8]) -> Result<u64, ChainError> {
        Ok(21_000)
    }

    async fn send_deploy(
        &self,
        _creation_code: &[u8],
        _gas_limit: u64,
        _fees: FeeData,
    ) -> Result<H256, ChainError> {
        Err(ChainError::Other("RecordingChain does not deploy".to_owned()))
    }

    async fn send_call(&self, _to: Address, calldata: &[u8]) -> Result<H256, ChainError> {
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push(calldata.to_vec());
        Ok(H256::from_low_u64_be(sent.len() as u64))
    }

    async fn wait_for_receipt(&self, tx_hash: H256, _max_wait: Duration) -> Result<Receipt, ChainError> {
        let sent = self.sent();
        let calldata = sent
            .get((tx_hash.to_low_u64_be() as usize).saturating_sub(1))
            .ok_or_else(|| ChainError::Other(format!("unknown transaction {tx_hash:#x}")))?;
        let reverted = self
            .reverting
            .iter()
            .any(|address| calldata.ends_with(address.as_bytes()));
        Ok(Receipt {
            transaction_hash: tx_hash,
            block_number: 1,
            gas_used: 50_000,
            status: !reverted,
            contract_address: None,
        })
    }

    async fn block_timestamp(&self, _block_number: u64) -> Result<u64, ChainError> {
        Ok(0)
    }

    async fn call(&self, _to: Address, _calldata: &[u8]) -> Result<Vec<u8>, ChainError> {
        Ok(Vec::new())
    }

    async fn code_at(&self, _address: Address) -> Result<Vec<u8>, ChainError> {
        Ok(Vec::new())
    }
}
