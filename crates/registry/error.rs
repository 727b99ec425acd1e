use std::path::PathBuf;

use arbdeploy_common::types::RecordError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry file {} is not valid JSON ({source}); fix or move it aside before deploying again", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "registry {} is locked by another process (gave up after {attempts} attempts); if no deployment is running, remove {}",
        .path.display(),
        .lock.display()
    )]
    Locked {
        path: PathBuf,
        lock: PathBuf,
        attempts: u32,
    },
    #[error("registry entry {network}.{contract} is malformed: {source}")]
    MalformedEntry {
        network: String,
        contract: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("refusing to record {network}.{contract}: {source}")]
    InvalidRecord {
        network: String,
        contract: String,
        #[source]
        source: RecordError,
    },
    #[error("failed to serialize registry document: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("registry task failed: {0}")]
    Task(String),
    #[error("in-memory registry lock poisoned")]
    Poisoned,
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
