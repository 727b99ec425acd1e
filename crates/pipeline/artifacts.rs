//! Compiled contract artifacts from a Hardhat or Foundry project.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error(
        "no artifact for {name} under {} (looked in {}); compile the contracts first",
        .root.display(),
        display_paths(.searched)
    )]
    NotFound {
        name: String,
        root: PathBuf,
        searched: Vec<PathBuf>,
    },
    #[error("failed to read artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {} is malformed: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("artifact {} has no creation bytecode (abstract contract or interface?)", .path.display())]
    EmptyBytecode { path: PathBuf },
    #[error("artifact {} needs library linking before deployment", .path.display())]
    UnlinkedLibrary { path: PathBuf },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLayout {
    Hardhat,
    Foundry,
}

impl fmt::Display for ArtifactLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLayout::Hardhat => f.write_str("hardhat"),
            ArtifactLayout::Foundry => f.write_str("foundry"),
        }
    }
}

/// Inputs an explorer needs to reproduce the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSource {
    pub fully_qualified_name: String,
    pub compiler_version: String,
    pub standard_json_input: String,
}

#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub layout: ArtifactLayout,
    pub path: PathBuf,
    pub bytecode: Vec<u8>,
    pub verification: Option<VerificationSource>,
}

fn candidates(root: &Path, name: &str) -> [(ArtifactLayout, PathBuf); 2] {
    let file = format!("{name}.json");
    let dir = format!("{name}.sol");
    [
        (
            ArtifactLayout::Hardhat,
            root.join("artifacts").join("contracts").join(&dir).join(&file),
        ),
        (ArtifactLayout::Foundry, root.join("out").join(&dir).join(&file)),
    ]
}

fn read_json(path: &Path) -> Result<Value, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|err| ArtifactError::Malformed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn decode_bytecode(path: &Path, raw: &str) -> Result<Vec<u8>, ArtifactError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.contains("__") {
        return Err(ArtifactError::UnlinkedLibrary {
            path: path.to_path_buf(),
        });
    }
    let bytecode = hex::decode(digits).map_err(|err| ArtifactError::Malformed {
        path: path.to_path_buf(),
        reason: format!("bytecode is not hex: {err}"),
    })?;
    if bytecode.is_empty() {
        return Err(ArtifactError::EmptyBytecode {
            path: path.to_path_buf(),
        });
    }
    Ok(bytecode)
}

/// Hardhat keeps the compiler input in a build-info file referenced from
/// `<Name>.dbg.json`. Missing pieces just disable automatic verification.
fn hardhat_verification_source(artifact_path: &Path, artifact: &Value) -> Option<VerificationSource> {
    let source_name = artifact.get("sourceName")?.as_str()?;
    let contract_name = artifact.get("contractName")?.as_str()?;
    let dbg_path = artifact_path.with_extension("dbg.json");
    let dbg = read_json(&dbg_path).ok()?;
    let build_info_path = artifact_path.parent()?.join(dbg.get("buildInfo")?.as_str()?);
    let build_info = match read_json(&build_info_path) {
        Ok(build_info) => build_info,
        Err(err) => {
            debug!(%err, "Hardhat build-info unavailable, verification sources disabled");
            return None;
        }
    };
    let version = build_info.get("solcLongVersion")?.as_str()?;
    Some(VerificationSource {
        fully_qualified_name: format!("{source_name}:{contract_name}"),
        compiler_version: format!("v{}", version.trim_start_matches('v')),
        standard_json_input: build_info.get("input")?.to_string(),
    })
}

/// Finds `name` in the Hardhat layout, then the Foundry layout.
pub fn load_artifact(root: &Path, name: &str) -> Result<ContractArtifact, ArtifactError> {
    let searched = candidates(root, name);
    let Some((layout, path)) = searched.iter().find(|(_, path)| path.is_file()) else {
        return Err(ArtifactError::NotFound {
            name: name.to_owned(),
            root: root.to_path_buf(),
            searched: searched.into_iter().map(|(_, path)| path).collect(),
        });
    };

    let artifact = read_json(path)?;
    let raw_bytecode = match layout {
        ArtifactLayout::Hardhat => artifact.get("bytecode").and_then(Value::as_str),
        ArtifactLayout::Foundry => artifact
            .get("bytecode")
            .and_then(|bytecode| bytecode.get("object"))
            .and_then(Value::as_str),
    }
    .ok_or_else(|| ArtifactError::Malformed {
        path: path.clone(),
        reason: "missing creation bytecode".to_owned(),
    })?;

    let bytecode = decode_bytecode(path, raw_bytecode)?;
    let verification = match layout {
        ArtifactLayout::Hardhat => hardhat_verification_source(path, &artifact),
        ArtifactLayout::Foundry => None,
    };
    debug!(
        contract = name,
        %layout,
        path = %path.display(),
        bytes = bytecode.len(),
        "Loaded contract artifact"
    );

    Ok(ContractArtifact {
        name: name.to_owned(),
        layout: *layout,
        path: path.clone(),
        bytecode,
        verification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().expect("has parent")).expect("mkdir");
        fs::write(path, value.to_string()).expect("write");
    }

    #[test]
    fn loads_hardhat_artifact_with_build_info() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("artifacts/contracts/ProfitVault.sol");
        write(
            &dir.join("ProfitVault.json"),
            &json!({
                "contractName": "ProfitVault",
                "sourceName": "contracts/ProfitVault.sol",
                "bytecode": "0x6080604052",
            }),
        );
        write(
            &dir.join("ProfitVault.dbg.json"),
            &json!({ "buildInfo": "../../build-info/abc.json" }),
        );
        write(
            &root.path().join("artifacts/build-info/abc.json"),
            &json!({
                "solcLongVersion": "0.8.24+commit.e11b9ed9",
                "input": { "language": "Solidity", "sources": {} }
            }),
        );

        let artifact = load_artifact(root.path(), "ProfitVault").expect("artifact loads");
        assert_eq!(artifact.layout, ArtifactLayout::Hardhat);
        assert_eq!(artifact.bytecode, vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        let source = artifact.verification.expect("build info found");
        assert_eq!(source.fully_qualified_name, "contracts/ProfitVault.sol:ProfitVault");
        assert_eq!(source.compiler_version, "v0.8.24+commit.e11b9ed9");
        assert!(source.standard_json_input.contains("Solidity"));
    }

    #[test]
    fn loads_foundry_artifact_without_sources() {
        let root = tempfile::tempdir().expect("tempdir");
        write(
            &root.path().join("out/MultiDexRouter.sol/MultiDexRouter.json"),
            &json!({ "bytecode": { "object": "0x60016002" } }),
        );
        let artifact = load_artifact(root.path(), "MultiDexRouter").expect("artifact loads");
        assert_eq!(artifact.layout, ArtifactLayout::Foundry);
        assert_eq!(artifact.bytecode.len(), 4);
        assert!(artifact.verification.is_none());
    }

    #[test]
    fn reports_missing_empty_and_unlinked_artifacts() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            load_artifact(root.path(), "FlashLoanArbitrage"),
            Err(ArtifactError::NotFound { searched, .. }) if searched.len() == 2
        ));

        write(
            &root.path().join("out/IVault.sol/IVault.json"),
            &json!({ "bytecode": { "object": "0x" } }),
        );
        assert!(matches!(
            load_artifact(root.path(), "IVault"),
            Err(ArtifactError::EmptyBytecode { .. })
        ));

        write(
            &root.path().join("out/Linked.sol/Linked.json"),
            &json!({ "bytecode": { "object": "0x6080__$abcdef$__6040" } }),
        );
        assert!(matches!(
            load_artifact(root.path(), "Linked"),
            Err(ArtifactError::UnlinkedLibrary { .. })
        ));
    }
}
