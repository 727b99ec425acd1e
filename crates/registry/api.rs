// Storage API for the deployment registry

use std::fmt::Debug;

use arbdeploy_common::types::DeploymentRecord;

use crate::{document::RegistryDocument, error::RegistryError};

/// Key-value view of the registry, keyed by `(network, contract type)`.
///
/// Implementations are blocking; [`crate::Registry`] moves calls onto the
/// blocking pool.
pub trait RegistryEngine: Debug + Send + Sync {
    /// Returns the record stored for the pair, `None` if absent or `null`.
    fn get(&self, network: &str, contract: &str) -> Result<Option<DeploymentRecord>, RegistryError>;

    /// Stores `record`, replacing any previous entry for the pair, and
    /// returns the replaced record.
    fn put(
        &self,
        network: &str,
        contract: &str,
        record: &DeploymentRecord,
    ) -> Result<Option<DeploymentRecord>, RegistryError>;

    /// A complete copy of the current document.
    fn snapshot(&self) -> Result<RegistryDocument, RegistryError>;
}
