use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use arbdeploy_common::{Address, H256, types::DeploymentRecord};
use arbdeploy_registry::{JsonFileRegistry, LockOptions, RegistryDocument, RegistryEngine};

const WRITERS: u64 = 8;
const NETWORKS: [&str; 4] = ["ethereum", "arbitrum", "sepolia", "base"];
const CONTRACTS: [&str; 2] = ["FlashLoanArbitrage", "MultiDexRouter"];

fn record(network: &str, seq: u64) -> DeploymentRecord {
    serde_json::from_value(serde_json::json!({
        "network": network,
        "chainId": 1,
        "contractAddress": format!("{:#x}", Address::from_low_u64_be(0x1000 + seq)),
        "deployerAddress": format!("{:#x}", Address::from_low_u64_be(0xd0)),
        "transactionHash": format!("{:#x}", H256::from_low_u64_be(0x1000 + seq)),
        "blockNumber": seq,
        "timestamp": 1_700_000_000u64 + seq,
        "verified": false
    }))
    .expect("fixture parses")
}

fn patient() -> LockOptions {
    LockOptions {
        attempts: 500,
        retry_delay: Duration::from_millis(2),
        ..LockOptions::default()
    }
}

fn pair(seq: u64) -> (&'static str, &'static str) {
    let seq = seq as usize;
    (NETWORKS[seq % NETWORKS.len()], CONTRACTS[seq / NETWORKS.len() % CONTRACTS.len()])
}

#[test]
fn concurrent_writers_never_lose_entries_or_expose_partial_documents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path: PathBuf = dir.path().join("deployments.json");
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let path = path.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::Acquire) {
                match fs::read_to_string(&path) {
                    Ok(raw) => {
                        assert!(
                            serde_json::from_str::<serde_json::Value>(&raw).is_ok(),
                            "reader observed a partial document: {raw:?}"
                        );
                        observed += 1;
                    }
                    Err(err) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
                }
            }
            observed
        })
    };

    // Each writer gets its own engine instance, like separate processes would.
    let writers: Vec<_> = (0..WRITERS)
        .map(|seq| {
            let registry = JsonFileRegistry::new(&path).with_lock_options(patient());
            thread::spawn(move || {
                let (network, contract) = pair(seq);
                registry
                    .put(network, contract, &record(network, seq))
                    .expect("write succeeds under contention");
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }
    done.store(true, Ordering::Release);
    reader.join().expect("reader thread");

    let document = JsonFileRegistry::new(&path).snapshot().expect("final document parses");
    for seq in 0..WRITERS {
        let (network, contract) = pair(seq);
        let stored = document
            .get(network, contract)
            .expect("entry parses")
            .unwrap_or_else(|| panic!("{network}.{contract} was dropped"));
        assert_eq!(stored.contract_address, Address::from_low_u64_be(0x1000 + seq));
    }
    assert_eq!(document.networks().count(), NETWORKS.len());
    assert!(!dir.path().join("deployments.json.lock").exists());
}

#[test]
fn sequential_runs_accumulate_into_one_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("deployments.json");

    for seq in 0..3 {
        JsonFileRegistry::new(&path)
            .put("sepolia", CONTRACTS[seq as usize % 2], &record("sepolia", seq))
            .expect("write");
    }

    let raw = fs::read_to_string(&path).expect("registry written");
    let document = RegistryDocument::from_json_str(&raw).expect("valid JSON");
    let entries = document.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        document
            .get("sepolia", "FlashLoanArbitrage")
            .expect("entry parses")
            .map(|record| record.block_number),
        Some(2)
    );
}
