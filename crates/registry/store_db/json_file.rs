use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use arbdeploy_common::types::DeploymentRecord;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    api::RegistryEngine,
    document::RegistryDocument,
    error::RegistryError,
    lock::{LockGuard, LockOptions},
};

/// Registry backed by one pretty-printed JSON file.
///
/// Reads never lock: the file is only ever replaced by rename, so a reader
/// sees either the previous or the next complete document. Writes hold the
/// sibling lock for the whole read-merge-replace cycle.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
    lock_options: LockOptions,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_options: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RegistryDocument, RegistryError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RegistryDocument::new()),
            Err(err) => return Err(RegistryError::io(&self.path, err)),
        };
        RegistryDocument::from_json_str(&raw).map_err(|source| RegistryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Temp file in the target directory, fsync, then rename over the target.
    fn replace(&self, document: &RegistryDocument) -> Result<(), RegistryError> {
        let rendered = document.to_pretty_json()?;
        let directory = self.directory();

        let mut temp = NamedTempFile::new_in(&directory)
            .map_err(|err| RegistryError::io(&directory, err))?;
        temp.write_all(rendered.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| RegistryError::io(temp.path(), err))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o644))
                .map_err(|err| RegistryError::io(temp.path(), err))?;
        }
        temp.persist(&self.path)
            .map_err(|err| RegistryError::io(&self.path, err.error))?;
        Ok(())
    }
}

impl RegistryEngine for JsonFileRegistry {
    fn get(&self, network: &str, contract: &str) -> Result<Option<DeploymentRecord>, RegistryError> {
        self.load()?.get(network, contract)
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

        let directory = self.directory();
        fs::create_dir_all(&directory).map_err(|err| RegistryError::io(&directory, err))?;

        let _guard = LockGuard::acquire(&self.path, &self.lock_options)?;
        let mut document = self.load()?;
        let previous = document.insert(network, contract, record)?;
        self.replace(&document)?;
        debug!(path = %self.path.display(), network, contract, "Registry document replaced");

        Ok(previous.and_then(|value| serde_json::from_value(value).ok()))
    }

    fn snapshot(&self) -> Result<RegistryDocument, RegistryError> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::lock_path_for;
    use arbdeploy_common::{Address, H256, U256, types::DeploymentStatus};
    use serde_json::{Map, json};
    use std::time::Duration;

    fn record(low: u64) -> DeploymentRecord {
        DeploymentRecord {
            network: "sepolia".to_owned(),
            chain_id: 11155111,
            contract_name: "FlashLoanArbitrage".to_owned(),
            contract_address: Address::from_low_u64_be(low),
            deployer_address: Address::from_low_u64_be(0xd0),
            transaction_hash: H256::from_low_u64_be(low),
            block_number: 7_000_000,
            timestamp: 1_700_000_123,
            verified: true,
            gas_used: Some(2_100_000),
            approved_routers: vec![Address::from_low_u64_be(0x77)],
            failed_routers: Vec::new(),
            minimum_profit: Some(U256::zero()),
            smoke_test_passed: Some(true),
            status: DeploymentStatus::Deployed,
            warnings: Vec::new(),
            extra: Map::new(),
        }
    }

    #[test]
    fn record_round_trips_through_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = JsonFileRegistry::new(dir.path().join("deployments.json"));

        let previous = registry
            .put("sepolia", "FlashLoanArbitrage", &record(1))
            .expect("write succeeds");
        assert!(previous.is_none());

        let reloaded = registry
            .get("sepolia", "FlashLoanArbitrage")
            .expect("read succeeds")
            .expect("record present");
        assert_eq!(reloaded, record(1));
        assert!(!lock_path_for(registry.path()).exists());
    }

    #[test]
    fn put_returns_the_replaced_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = JsonFileRegistry::new(dir.path().join("deployments.json"));
        registry
            .put("sepolia", "FlashLoanArbitrage", &record(1))
            .expect("first write");
        let previous = registry
            .put("sepolia", "FlashLoanArbitrage", &record(2))
            .expect("second write");
        assert_eq!(previous.map(|r| r.contract_address), Some(Address::from_low_u64_be(1)));
    }

    #[test]
    fn unknown_content_survives_a_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deployments.json");
        fs::write(
            &path,
            serde_json::to_string_pretty(&json!({
                "_schemaVersion": 1,
                "_notes": "managed by ops",
                "ethereum": { "LegacyBot": { "contractAddress": "0x01" } }
            }))
            .expect("fixture renders"),
        )
        .expect("write fixture");

        JsonFileRegistry::new(&path)
            .put("sepolia", "FlashLoanArbitrage", &record(3))
            .expect("write succeeds");

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read back")).expect("valid JSON");
        assert_eq!(on_disk["_notes"], json!("managed by ops"));
        assert_eq!(on_disk["ethereum"]["LegacyBot"]["contractAddress"], json!("0x01"));
        assert_eq!(
            on_disk["sepolia"]["FlashLoanArbitrage"]["transactionHash"],
            json!(format!("{:#x}", H256::from_low_u64_be(3)))
        );
    }

    #[test]
    fn corrupt_file_is_reported_with_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deployments.json");
        fs::write(&path, "{ \"sepolia\": ").expect("write fixture");
        let registry = JsonFileRegistry::new(&path);

        match registry.put("sepolia", "FlashLoanArbitrage", &record(1)) {
            Err(RegistryError::Corrupt { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Corrupt, got {other:?}"),
        }
        // The failed write must not leave the registry locked.
        assert!(!lock_path_for(&path).exists());
        assert_eq!(fs::read_to_string(&path).expect("read back"), "{ \"sepolia\": ");
    }

    #[test]
    fn missing_and_empty_files_read_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deployments.json");
        let registry = JsonFileRegistry::new(&path);
        assert_eq!(registry.snapshot().expect("missing is empty"), RegistryDocument::new());
        fs::write(&path, "").expect("write fixture");
        assert!(registry.get("sepolia", "FlashLoanArbitrage").expect("empty").is_none());
    }

    #[test]
    fn zero_address_record_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = JsonFileRegistry::new(dir.path().join("deployments.json"));
        let mut bad = record(1);
        bad.contract_address = Address::zero();
        assert!(matches!(
            registry.put("sepolia", "FlashLoanArbitrage", &bad),
            Err(RegistryError::InvalidRecord { .. })
        ));
        assert!(!registry.path().exists());
    }

    #[test]
    fn held_lock_surfaces_as_locked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = JsonFileRegistry::new(dir.path().join("deployments.json")).with_lock_options(
            LockOptions {
                attempts: 2,
                retry_delay: Duration::from_millis(1),
                ..LockOptions::default()
            },
        );
        let _held = LockGuard::acquire(registry.path(), &LockOptions::default()).expect("lock");
        assert!(matches!(
            registry.put("sepolia", "FlashLoanArbitrage", &record(1)),
            Err(RegistryError::Locked { attempts: 2, .. })
        ));
    }
}
