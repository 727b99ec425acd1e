//! Batch driver: walks a manifest of `(contract type, network)` pairs,
//! skips the ones already recorded and runs the rest one at a time.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt, fs,
    path::{Path, PathBuf},
};

use arbdeploy_common::{
    Address,
    networks::{Network, normalize_network},
    utils::to_checksum,
};
use arbdeploy_registry::{Registry, RegistryDocument};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{config::PipelineConfig, contracts, errors::PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub contract: String,
    pub network: String,
}

/// Ordered list of pairs to deploy; execution follows this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

const DEFAULT_PAIRS: &[(&str, &str)] = &[
    ("FlashLoanArbitrage", "sepolia"),
    ("MultiDexRouter", "sepolia"),
    ("ProfitVault", "sepolia"),
    ("FlashLoanArbitrage", "arbitrum"),
    ("MultiDexRouter", "arbitrum"),
    ("FlashLoanArbitrage", "base"),
    ("MultiDexRouter", "base"),
    ("FlashLoanArbitrage", "optimism"),
    ("FlashLoanArbitrage", "polygon"),
    ("MultiDexRouter", "bsc"),
];

impl Default for Manifest {
    fn default() -> Self {
        Self {
            entries: DEFAULT_PAIRS
                .iter()
                .map(|(contract, network)| ManifestEntry {
                    contract: (*contract).to_owned(),
                    network: (*network).to_owned(),
                })
                .collect(),
        }
    }
}

impl Manifest {
    /// Reads a JSON array of `{"contract": .., "network": ..}` objects.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ManifestError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    /// Empty means every network in the manifest.
    pub networks: Vec<String>,
    /// Empty means every contract type in the manifest.
    pub contracts: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Skip { address: Address },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub contract: &'static str,
    pub network: &'static Network,
    pub action: PlanAction,
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.contract, self.network)
    }
}

/// Classifies every manifest pair that passes `filter`.
///
/// Names are normalised first, so an unknown network or contract type in the
/// manifest or the filter fails the whole plan before anything runs.
/// `registry_for` picks the registry of each contract type; every registry
/// file is read once.
pub async fn plan(
    manifest: &Manifest,
    filter: &BatchFilter,
    registry_for: impl Fn(&PipelineConfig) -> Registry,
) -> Result<Vec<PlanEntry>, PipelineError> {
    let networks = filter
        .networks
        .iter()
        .map(|name| normalize_network(name).map(|network| network.id))
        .collect::<Result<Vec<_>, _>>()?;
    let wanted_contracts = filter
        .contracts
        .iter()
        .map(|name| contracts::find(name).map(|config| config.contract_name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut documents: HashMap<&'static str, RegistryDocument> = HashMap::new();
    let mut entries = Vec::new();
    for entry in &manifest.entries {
        let network = normalize_network(&entry.network)?;
        let config = contracts::find(&entry.contract)?;
        let contract = config.contract_name;
        if !networks.is_empty() && !networks.contains(&network.id) {
            continue;
        }
        if !wanted_contracts.is_empty() && !wanted_contracts.contains(&contract) {
            continue;
        }
        let document = match documents.entry(config.registry_file) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(registry_for(&config).snapshot().await?),
        };
        let action = match document.get(network.id, contract)? {
            Some(record) => PlanAction::Skip {
                address: record.contract_address,
            },
            None => PlanAction::Pending,
        };
        entries.push(PlanEntry {
            contract,
            network,
            action,
        });
    }
    Ok(entries)
}

/// Failure of one isolated pair run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PairFailure {
    pub message: String,
}

/// Runs one pair in isolation; the binary spawns a child process.
#[async_trait::async_trait]
pub trait PairRunner: Send + Sync {
    async fn run(&self, contract: &str, network: &'static Network) -> Result<(), PairFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairResult {
    Succeeded,
    Failed(String),
    Skipped { address: Address },
    /// Pending pair left alone by a dry run.
    Planned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    pub contract: &'static str,
    pub network: &'static Network,
    pub result: PairResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<PairOutcome>,
}

impl BatchReport {
    fn count(&self, predicate: impl Fn(&PairResult) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.result))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|result| matches!(result, PairResult::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|result| matches!(result, PairResult::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|result| matches!(result, PairResult::Skipped { .. }))
    }

    pub fn planned(&self) -> usize {
        self.count(|result| matches!(result, PairResult::Planned))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.outcomes.len() + 1);
        for outcome in &self.outcomes {
            let status = match &outcome.result {
                PairResult::Succeeded => "deployed".to_owned(),
                PairResult::Failed(message) => format!("FAILED: {message}"),
                PairResult::Skipped { address } => format!("skipped (at {})", to_checksum(address)),
                PairResult::Planned => "would deploy".to_owned(),
            };
            lines.push(format!(
                "{:<20} {:<18} {status}",
                outcome.contract, outcome.network.id
            ));
        }
        lines.push(format!(
            "{} succeeded, {} failed, {} skipped, {} planned",
            self.succeeded(),
            self.failed(),
            self.skipped(),
            self.planned()
        ));
        lines.join("\n")
    }
}

/// Executes pending entries strictly in plan order. A failing pair is
/// recorded and the driver moves on.
pub async fn execute(entries: &[PlanEntry], runner: &dyn PairRunner, dry_run: bool) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in entries {
        let result = match entry.action {
            PlanAction::Skip { address } => {
                info!(pair = %entry, address = %to_checksum(&address), "Already deployed, skipping");
                PairResult::Skipped { address }
            }
            PlanAction::Pending if dry_run => {
                info!(pair = %entry, "Would deploy");
                PairResult::Planned
            }
            PlanAction::Pending => {
                info!(pair = %entry, "Deploying");
                match runner.run(entry.contract, entry.network).await {
                    Ok(()) => PairResult::Succeeded,
                    Err(failure) => {
                        error!(pair = %entry, error = %failure, "Pair failed; continuing");
                        PairResult::Failed(failure.message)
                    }
                }
            }
        };
        report.outcomes.push(PairOutcome {
            contract: entry.contract,
            network: entry.network,
            result,
        });
    }
    report
}
