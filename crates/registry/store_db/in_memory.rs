use std::sync::{Arc, Mutex, MutexGuard};

use arbdeploy_common::types::DeploymentRecord;

use crate::{api::RegistryEngine, document::RegistryDocument, error::RegistryError};

/// Process-local registry for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRegistry(Arc<Mutex<RegistryDocument>>);

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: RegistryDocument) -> Self {
        Self(Arc::new(Mutex::new(document)))
    }

    fn inner(&self) -> Result<MutexGuard<'_, RegistryDocument>, RegistryError> {
        self.0.lock().map_err(|_| RegistryError::Poisoned)
    }
}

impl RegistryEngine for InMemoryRegistry {
    fn get(&self, network: &str, contract: &str) -> Result<Option<DeploymentRecord>, RegistryError> {
        self.inner()?.get(network, contract)
    }

    fn put(
        &self,
        network: &str,
        contract: &str,
        record: &DeploymentRecord,
    ) -> Result<Option<DeploymentRecord>, RegistryError> {
        record
            .validate()
            .map_err(|source| RegistryError::InvalidRecord {
                network: network.to_owned(),
                contract: contract.to_owned(),
                source,
            })?;
        let previous = self.inner()?.insert(network, contract, record)?;
        Ok(previous.and_then(|value| serde_json::from_value(value).ok()))
    }

    fn snapshot(&self) -> Result<RegistryDocument, RegistryError> {
        Ok(self.inner()?.clone())
    }
}
