use std::{path::Path, sync::Arc};

use arbdeploy_common::types::DeploymentRecord;
use tracing::{error, info};

use crate::{
    api::RegistryEngine,
    document::RegistryDocument,
    error::RegistryError,
    lock::LockOptions,
    store_db::{in_memory::InMemoryRegistry, json_file::JsonFileRegistry},
};

#[derive(Debug, Clone)]
pub struct Registry {
    engine: Arc<dyn RegistryEngine>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            engine: Arc::new(InMemoryRegistry::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    InMemory,
    JsonFile,
}

impl Registry {
    pub fn new(path: &Path, engine_type: EngineType) -> Self {
        info!(path = %path.display(), "Opening deployment registry ({engine_type:?})");
        match engine_type {
            EngineType::InMemory => Self::default(),
            EngineType::JsonFile => Self::from_engine(JsonFileRegistry::new(path)),
        }
    }

    pub fn json_file(path: &Path, lock_options: LockOptions) -> Self {
        Self::from_engine(JsonFileRegistry::new(path).with_lock_options(lock_options))
    }

    pub fn from_engine(engine: impl RegistryEngine + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RegistryEngine) -> Result<T, RegistryError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || op(engine.as_ref()))
            .await
            .map_err(|err| RegistryError::Task(err.to_string()))?
    }

    pub async fn get(
        &self,
        network: &str,
        contract: &str,
    ) -> Result<Option<DeploymentRecord>, RegistryError> {
        let (network, contract) = (network.to_owned(), contract.to_owned());
        self.blocking(move |engine| engine.get(&network, &contract)).await
    }

    pub async fn is_deployed(&self, network: &str, contract: &str) -> Result<bool, RegistryError> {
        Ok(self.get(network, contract).await?.is_some())
    }

    /// Lock-guarded read-merge-replace of one entry. Returns the record that
    /// was replaced, if any.
    pub async fn update(
        &self,
        network: &str,
        contract: &str,
        record: DeploymentRecord,
    ) -> Result<Option<DeploymentRecord>, RegistryError> {
        let (network, contract) = (network.to_owned(), contract.to_owned());
        let address = record.contract_address;
        let (log_network, log_contract) = (network.clone(), contract.clone());
        let result = self
            .blocking(move |engine| engine.put(&network, &contract, &record))
            .await;
        match &result {
            Ok(_) => info!(
                network = %log_network,
                contract = %log_contract,
                address = %format!("{address:#x}"),
                "Deployment recorded in registry"
            ),
            Err(err) => error!(
                network = %log_network,
                contract = %log_contract,
                address = %format!("{address:#x}"),
                %err,
                "Failed to record deployment in registry"
            ),
        }
        result
    }

    pub async fn snapshot(&self) -> Result<RegistryDocument, RegistryError> {
        self.blocking(|engine| engine.snapshot()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbdeploy_common::{H256, utils::parse_address};

    fn record() -> DeploymentRecord {
        serde_json::from_value(serde_json::json!({
            "network": "localhost",
            "chainId": 31337,
            "contractAddress": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "deployerAddress": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "transactionHash": format!("{:#x}", H256::repeat_byte(0xab)),
            "blockNumber": 1,
            "timestamp": 1_700_000_000u64,
            "verified": false
        }))
        .expect("fixture parses")
    }

    #[tokio::test]
    async fn in_memory_registry_tracks_deployments() {
        let registry = Registry::default();
        assert!(!registry.is_deployed("localhost", "MultiDexRouter").await.expect("read"));

        let previous = registry
            .update("localhost", "MultiDexRouter", record())
            .await
            .expect("write");
        assert!(previous.is_none());
        assert!(registry.is_deployed("localhost", "MultiDexRouter").await.expect("read"));

        let snapshot = registry.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.networks().count(), 1);
    }

    #[tokio::test]
    async fn json_file_engine_is_selected_by_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deployments.json");
        let registry = Registry::new(&path, EngineType::JsonFile);
        registry
            .update("localhost", "MultiDexRouter", record())
            .await
            .expect("write creates missing directories");
        let stored = registry
            .get("localhost", "MultiDexRouter")
            .await
            .expect("read")
            .expect("present");
        assert_eq!(
            stored.contract_address,
            parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").expect("address literal")
        );
        assert!(path.exists());
    }
}
