use arbdeploy_common::types::DeploymentRecord;
use serde_json::{Map, Value, json};

use crate::error::RegistryError;

/// Top-level keys starting with this prefix hold metadata, not networks.
pub const METADATA_PREFIX: char = '_';
pub const SCHEMA_VERSION: u64 = 1;
const SCHEMA_VERSION_KEY: &str = "_schemaVersion";

/// The whole registry file.
///
/// Kept as a raw JSON object so that fields this tool does not know about
/// (other contract types, notes, newer record fields) survive a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDocument(Map<String, Value>);

#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    /// Present as `null`: the contract type is known but not deployed here.
    Undeployed,
    Deployed(Box<DeploymentRecord>),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub network: String,
    pub contract: String,
    pub state: EntryState,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with(METADATA_PREFIX)
}

impl RegistryDocument {
    pub fn new() -> Self {
        let mut root = Map::new();
        root.insert(SCHEMA_VERSION_KEY.to_owned(), json!(SCHEMA_VERSION));
        Self(root)
    }

    /// Parses a registry file. Blank input is an empty document, since a
    /// crashed `touch` or a fresh checkout may leave a zero-length file.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str::<Map<String, Value>>(raw).map(Self)
    }

    pub fn to_pretty_json(&self) -> Result<String, RegistryError> {
        let mut rendered = serde_json::to_string_pretty(&self.0).map_err(RegistryError::Serialize)?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn schema_version(&self) -> Option<u64> {
        self.0.get(SCHEMA_VERSION_KEY).and_then(Value::as_u64)
    }

    /// Network entries only; metadata keys and non-object values are skipped.
    pub fn networks(&self) -> impl Iterator<Item = (&str, &Map<String, Value>)> {
        self.0.iter().filter_map(|(key, value)| {
            if is_metadata_key(key) {
                return None;
            }
            value.as_object().map(|contracts| (key.as_str(), contracts))
        })
    }

    pub fn get(&self, network: &str, contract: &str) -> Result<Option<DeploymentRecord>, RegistryError> {
        let Some(value) = self.0.get(network).and_then(|contracts| contracts.get(contract)) else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| RegistryError::MalformedEntry {
                network: network.to_owned(),
                contract: contract.to_owned(),
                source,
            })
    }

    pub fn contains(&self, network: &str, contract: &str) -> bool {
        self.0
            .get(network)
            .and_then(|contracts| contracts.get(contract))
            .is_some_and(|value| !value.is_null())
    }

    /// Writes `record` under `[network][contract]`, leaving sibling entries
    /// untouched, and returns whatever was stored there before.
    pub fn insert(
        &mut self,
        network: &str,
        contract: &str,
        record: &DeploymentRecord,
    ) -> Result<Option<Value>, RegistryError> {
        let value = serde_json::to_value(record).map_err(RegistryError::Serialize)?;
        if !self.0.get(network).is_some_and(Value::is_object) {
            self.0.insert(network.to_owned(), Value::Object(Map::new()));
        }
        let previous = match self.0.get_mut(network) {
            Some(Value::Object(contracts)) => contracts.insert(contract.to_owned(), value),
            _ => None,
        };
        Ok(previous.filter(|previous| !previous.is_null()))
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut entries = Vec::new();
        for (network, contracts) in self.networks() {
            for (contract, value) in contracts {
                let state = if value.is_null() {
                    EntryState::Undeployed
                } else {
                    match serde_json::from_value::<DeploymentRecord>(value.clone()) {
                        Ok(record) => EntryState::Deployed(Box::new(record)),
                        Err(err) => EntryState::Malformed(err.to_string()),
                    }
                };
                entries.push(RegistryEntry {
                    network: network.to_owned(),
                    contract: contract.clone(),
                    state,
                });
            }
        }
        entries
    }
}
