use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::serde_utils::{checksummed_address, checksummed_address_vec, u256_dec_str_opt};

/// Outcome of one deployment attempt, as persisted in the registry.
///
/// Only the fields up to `verified` are required by readers; the rest are
/// additive. Unknown keys found on disk are kept in `extra` so rewriting a
/// document never drops data written by a newer tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub network: String,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contract_name: String,
    #[serde(with = "checksummed_address")]
    pub contract_address: Address,
    #[serde(with = "checksummed_address")]
    pub deployer_address: Address,
    pub transaction_hash: H256,
    pub block_number: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(default, with = "checksummed_address_vec")]
    pub approved_routers: Vec<Address>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "checksummed_address_vec"
    )]
    pub failed_routers: Vec<Address>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "u256_dec_str_opt"
    )]
    pub minimum_profit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_test_passed: Option<bool>,
    #[serde(default)]
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    #[default]
    Deployed,
    /// On chain and recorded, but a post-deploy stage degraded.
    NeedsInvestigation,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("deployment record for {network} has a zero contract address")]
    ZeroContractAddress { network: String },
    #[error("deployment record for {network} has a zero transaction hash")]
    ZeroTransactionHash { network: String },
}

impl DeploymentRecord {
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.contract_address.is_zero() {
            return Err(RecordError::ZeroContractAddress {
                network: self.network.clone(),
            });
        }
        if self.transaction_hash.is_zero() {
            return Err(RecordError::ZeroTransactionHash {
                network: self.network.clone(),
            });
        }
        Ok(())
    }

    pub fn needs_investigation(&self) -> bool {
        self.status == DeploymentStatus::NeedsInvestigation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DeploymentRecord {
        DeploymentRecord {
            network: "sepolia".to_owned(),
            chain_id: 11155111,
            contract_name: "FlashLoanArbitrage".to_owned(),
            contract_address: Address::from_low_u64_be(0xabcdef),
            deployer_address: Address::from_low_u64_be(0x1234),
            transaction_hash: H256::from_low_u64_be(7),
            block_number: 5_000_000,
            timestamp: 1_700_000_000,
            verified: true,
            gas_used: Some(1_250_000),
            approved_routers: vec![Address::from_low_u64_be(0x99)],
            failed_routers: Vec::new(),
            minimum_profit: Some(U256::zero()),
            smoke_test_passed: Some(true),
            status: DeploymentStatus::Deployed,
            warnings: Vec::new(),
            extra: Map::new(),
        }
    }

    #[test]
    fn serializes_with_camel_case_and_checksums() {
        let value = serde_json::to_value(sample()).expect("record serializes");
        assert_eq!(value["chainId"], json!(11155111));
        assert_eq!(
            value["contractAddress"],
            json!("0x0000000000000000000000000000000000abcDeF")
        );
        assert_eq!(value["minimumProfit"], json!("0"));
        assert_eq!(value["status"], json!("deployed"));
        assert!(value.get("failedRouters").is_none());
        assert!(value.get("warnings").is_none());
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let mut value = serde_json::to_value(sample()).expect("record serializes");
        value["feeBps"] = json!(250);
        value["treasury"] = json!("0x0000000000000000000000000000000000000001");

        let record: DeploymentRecord =
            serde_json::from_value(value.clone()).expect("record deserializes");
        assert_eq!(record.extra.get("feeBps"), Some(&json!(250)));

        let rewritten = serde_json::to_value(&record).expect("record serializes");
        assert_eq!(rewritten, value);
    }

    #[test]
    fn minimal_record_from_another_tool_parses() {
        let record: DeploymentRecord = serde_json::from_value(json!({
            "network": "ethereum",
            "chainId": 1,
            "contractAddress": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "deployerAddress": "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359",
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ff",
            "blockNumber": 19000000,
            "timestamp": 1700000000,
            "verified": false
        }))
        .expect("minimal record parses");
        assert!(record.approved_routers.is_empty());
        assert_eq!(record.status, DeploymentStatus::Deployed);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn zero_contract_address_is_invalid() {
        let mut record = sample();
        record.contract_address = Address::zero();
        assert_eq!(
            record.validate(),
            Err(RecordError::ZeroContractAddress {
                network: "sepolia".to_owned()
            })
        );
    }
}
