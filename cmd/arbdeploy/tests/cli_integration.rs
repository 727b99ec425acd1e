use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use serde_json::{Value, json};

const BIN: &str = env!("CARGO_BIN_EXE_arbdeploy");

fn arbdeploy(registry: &Path, args: &[&str]) -> Command {
    let mut command = Command::new(BIN);
    command
        .arg("--registry")
        .arg(registry)
        .arg("--log.color")
        .arg("never")
        .args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("ARBDEPLOY_") {
            command.env_remove(key);
        }
    }
    command
}

fn record_file(dir: &Path, network: &str, contract: &str, low: u8) -> PathBuf {
    let path = dir.join(format!("{network}-{contract}.json"));
    let record = json!({
        "network": network,
        "chainId": 11155111,
        "contractName": contract,
        "contractAddress": format!("0x{}", format!("{low:02x}").repeat(20)),
        "deployerAddress": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        "transactionHash": format!("0x{}", format!("{low:02x}").repeat(32)),
        "blockNumber": 100 + u64::from(low),
        "timestamp": 1_760_000_000u64,
        "verified": false
    });
    std::fs::write(&path, record.to_string()).expect("write record file");
    path
}

fn read_registry(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).expect("registry exists");
    serde_json::from_str(&raw).expect("registry is valid JSON")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn concurrent_registry_set_processes_keep_every_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = dir.path().join("deployments.json");
    let pairs = [
        ("sepolia", "FlashLoanArbitrage"),
        ("sepolia", "MultiDexRouter"),
        ("sepolia", "ProfitVault"),
        ("base-sepolia", "FlashLoanArbitrage"),
        ("base-sepolia", "MultiDexRouter"),
        ("base-sepolia", "ProfitVault"),
        ("arbitrum-sepolia", "MultiDexRouter"),
        ("arbitrum-sepolia", "ProfitVault"),
    ];

    let children = pairs
        .iter()
        .enumerate()
        .map(|(index, (network, contract))| {
            let record = record_file(dir.path(), network, contract, index as u8 + 1);
            arbdeploy(
                &registry,
                &[
                    "registry",
                    "set",
                    "--network",
                    network,
                    "--contract",
                    contract,
                    "--record",
                    record.to_str().expect("utf-8 path"),
                ],
            )
            .spawn()
            .expect("spawn arbdeploy")
        })
        .collect::<Vec<_>>();

    for child in children {
        let output = child.wait_with_output().expect("wait for arbdeploy");
        assert!(output.status.success(), "{output:?}");
    }

    let document = read_registry(&registry);
    for (index, (network, contract)) in pairs.iter().enumerate() {
        let entry = &document[*network][*contract];
        assert_eq!(entry["blockNumber"], 101 + index as u64, "{network}/{contract}");
    }
    assert_eq!(document["_schemaVersion"], 1);
    assert!(!dir.path().join("deployments.json.lock").exists());
}

#[test]
fn status_lists_recorded_deployments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = dir.path().join("deployments.json");
    let record = record_file(dir.path(), "sepolia", "ProfitVault", 0xab);

    let output = arbdeploy(
        &registry,
        &[
            "registry",
            "set",
            "--network",
            "Sepolia",
            "--contract",
            "profitvault",
            "--record",
            record.to_str().expect("utf-8 path"),
        ],
    )
    .output()
    .expect("run registry set");
    assert!(output.status.success(), "{output:?}");

    let output = arbdeploy(&registry, &["status", "--network", "sepolia"])
        .output()
        .expect("run status");
    assert!(output.status.success(), "{output:?}");
    let listing = stdout(&output);
    assert!(listing.contains("ProfitVault"));
    assert!(listing.contains("0xABaBaBaBABabABabAbAbABAbABabababaBaBABaB"));

    let output = arbdeploy(&registry, &["status", "--network", "base"])
        .output()
        .expect("run status");
    assert!(stdout(&output).contains("holds no deployments"));
}

#[test]
fn mismatched_record_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = dir.path().join("deployments.json");
    let record = record_file(dir.path(), "sepolia", "ProfitVault", 0x07);

    let output = arbdeploy(
        &registry,
        &[
            "registry",
            "set",
            "--network",
            "base-sepolia",
            "--contract",
            "ProfitVault",
            "--record",
            record.to_str().expect("utf-8 path"),
        ],
    )
    .output()
    .expect("run registry set");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not base-sepolia"));
    assert!(!registry.exists());
}

#[test]
fn batch_dry_run_skips_recorded_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = dir.path().join("deployments.json");
    let record = record_file(dir.path(), "sepolia", "MultiDexRouter", 0x05);
    let output = arbdeploy(
        &registry,
        &[
            "registry",
            "set",
            "--network",
            "sepolia",
            "--contract",
            "MultiDexRouter",
            "--record",
            record.to_str().expect("utf-8 path"),
        ],
    )
    .output()
    .expect("run registry set");
    assert!(output.status.success(), "{output:?}");

    let output = arbdeploy(
        &registry,
        &["batch", "--networks", "sepolia", "--dry-run"],
    )
    .output()
    .expect("run batch");

    assert!(output.status.success(), "{output:?}");
    let summary = stdout(&output);
    assert!(summary.contains("0 succeeded, 0 failed, 1 skipped, 2 planned"), "{summary}");
}
