use std::{
    fs,
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use arbdeploy_common::{
    networks::{Network, normalize_network},
    types::DeploymentRecord,
    utils::to_checksum,
};
use arbdeploy_pipeline::{
    ErrorCategory, Pipeline, PipelineError, RpcChainClient, Verifier,
    artifacts::load_artifact,
    batch::{BatchFilter, Manifest, execute, plan},
    config::Confirmation,
    contracts,
    summary::{self, registry_fix_command},
    verification::{EtherscanVerifier, NoopVerifier},
};
use arbdeploy_registry::{EntryState, LockOptions, Registry};
use arbdeploy_rpc::{EthClient, EtherscanClient, LocalSigner};
use eyre::{WrapErr, bail, eyre};
use tracing::{error, info};
use url::Url;

use crate::{
    cli::{BatchOptions, DeployOptions, Options},
    runner::ProcessRunner,
};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
/// Deployed on chain but not recorded in the registry.
pub const EXIT_BOOKKEEPING: u8 = 2;

const LOCALHOST_RPC_URL: &str = "http://127.0.0.1:8545";

pub fn exit_code(category: ErrorCategory) -> u8 {
    match category {
        ErrorCategory::Bookkeeping => EXIT_BOOKKEEPING,
        ErrorCategory::Configuration
        | ErrorCategory::Resource
        | ErrorCategory::OnChain
        | ErrorCategory::Registry => EXIT_FAILURE,
    }
}

/// `--eth-rpc-url`, then `ARBDEPLOY_RPC_URL_<NETWORK>`, then the local node
/// for `localhost`.
pub fn resolve_rpc_url(
    network: &Network,
    flag: Option<&Url>,
    lookup: impl Fn(&str) -> Option<String>,
) -> eyre::Result<Url> {
    if let Some(url) = flag {
        return Ok(url.clone());
    }
    let key = network.rpc_url_env_key();
    if let Some(raw) = lookup(&key).filter(|raw| !raw.trim().is_empty()) {
        return Url::parse(raw.trim()).wrap_err_with(|| format!("{key} is not a valid URL"));
    }
    if network.id == "localhost" {
        return Ok(Url::parse(LOCALHOST_RPC_URL)?);
    }
    bail!("no RPC endpoint for {network}: pass --eth-rpc-url or set {key}")
}

/// Mainnet-class runs need a token naming the network, from the
/// environment or typed at the prompt.
async fn resolve_confirmation(network: &'static Network, tokens: &[String]) -> eyre::Result<Confirmation> {
    if !network.mainnet_class {
        return Ok(Confirmation::None);
    }
    if let Some(token) = tokens
        .iter()
        .map(|token| Confirmation::Token(token.clone()))
        .find(|confirmation| confirmation.confirms(network))
    {
        return Ok(token);
    }
    if !io::stdin().is_terminal() {
        return Ok(Confirmation::None);
    }
    let typed = tokio::task::spawn_blocking(move || -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(
            stderr,
            "{network} is a mainnet-class network and this deployment spends real funds.\nType `{}` to continue: ",
            network.id
        )?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await??;
    Ok(Confirmation::Token(typed.trim().to_owned()))
}

fn verifier_for(network: &Network, api_key: Option<&str>) -> eyre::Result<Arc<dyn Verifier>> {
    let verifier: Arc<dyn Verifier> = match api_key {
        _ if !network.explorer_supported => Arc::new(NoopVerifier {
            reason: format!("{network} has no supported block explorer"),
        }),
        Some(key) if !key.trim().is_empty() => Arc::new(EtherscanVerifier::new(
            EtherscanClient::new(key.trim())?,
        )),
        _ => Arc::new(NoopVerifier {
            reason: "ARBDEPLOY_ETHERSCAN_API_KEY is not set".to_owned(),
        }),
    };
    Ok(verifier)
}

pub async fn deploy(opts: &Options, deploy_opts: DeployOptions) -> eyre::Result<u8> {
    let network = normalize_network(&deploy_opts.network)?;
    let config = contracts::find(&deploy_opts.contract)?;
    let artifact = load_artifact(&deploy_opts.artifacts_dir, config.contract_name)?;
    let rpc_url = resolve_rpc_url(network, deploy_opts.rpc_url.as_ref(), |key| {
        std::env::var(key).ok()
    })?;
    let private_key = deploy_opts
        .private_key
        .as_deref()
        .ok_or_else(|| eyre!("no deployer key: set ARBDEPLOY_PRIVATE_KEY or pass --private-key"))?;
    let signer = LocalSigner::from_hex(private_key)?;

    info!(%network, contract = config.contract_name, rpc = %rpc_url, "Connecting");
    let chain = RpcChainClient::connect(EthClient::new(rpc_url.as_str())?, signer).await?;
    let verifier = verifier_for(network, deploy_opts.etherscan_api_key.as_deref())?;
    let confirmation = resolve_confirmation(network, &deploy_opts.confirm).await?;
    let registry_path = opts.registry_path(&config);
    let registry = Registry::json_file(&registry_path, LockOptions::default());

    let pipeline = Pipeline::new(
        Arc::new(chain),
        verifier,
        registry,
        network,
        deploy_opts.pipeline_options(confirmation),
    );
    match pipeline.run(&config, &artifact).await {
        Ok(report) => {
            println!("{}", summary::render(&report));
            Ok(EXIT_OK)
        }
        Err(err) => Ok(report_failure(&registry_path, &err)),
    }
}

/// Every registry file the catalog records into, or the `--registry` override.
pub fn registry_paths(opts: &Options) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for config in contracts::catalog() {
        let path = opts.registry_path(&config);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// `<registry dir>/<registry stem>.pending.<network>.<contract>.json`
pub fn pending_record_path(registry: &Path, record: &DeploymentRecord) -> PathBuf {
    let stem = registry
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deployments".to_owned());
    registry.with_file_name(format!(
        "{stem}.pending.{}.{}.json",
        record.network, record.contract_name
    ))
}

fn report_failure(registry: &Path, err: &PipelineError) -> u8 {
    let Some(record) = err.unrecorded_deployment() else {
        error!(category = ?err.category(), "{err}");
        eprintln!("error: {err}");
        if err.category() == ErrorCategory::OnChain {
            eprintln!("gas may have been spent; inspect the transaction before running again");
        }
        return exit_code(err.category());
    };

    let pending = pending_record_path(registry, record);
    let saved = serde_json::to_string_pretty(record)
        .map_err(io::Error::other)
        .and_then(|json| fs::write(&pending, json + "\n"));
    eprintln!("error: {err}");
    match saved {
        Ok(()) => eprintln!(
            "The record was saved to {}. Record it before any redeploy:\n  {}",
            pending.display(),
            registry_fix_command(registry, &pending, &record.network, &record.contract_name)
        ),
        Err(write_err) => {
            error!(path = %pending.display(), %write_err, "Failed to save the pending record");
            eprintln!(
                "Could not save the pending record ({write_err}); it is:\n{}",
                serde_json::to_string_pretty(record).unwrap_or_else(|_| format!("{record:?}"))
            );
        }
    }
    EXIT_BOOKKEEPING
}

pub async fn batch(opts: &Options, batch_opts: BatchOptions) -> eyre::Result<u8> {
    let manifest = match &batch_opts.manifest {
        Some(path) => Manifest::load(path)?,
        None => Manifest::default(),
    };
    let filter = BatchFilter {
        networks: batch_opts.networks,
        contracts: batch_opts.contracts,
        dry_run: batch_opts.dry_run,
    };
    let entries = plan(&manifest, &filter, |config| {
        Registry::json_file(&opts.registry_path(config), LockOptions::default())
    })
    .await?;
    info!(pairs = entries.len(), dry_run = filter.dry_run, "Batch planned");

    let runner = ProcessRunner::current(opts.registry.as_deref(), opts.log_level)?;
    let report = execute(&entries, &runner, filter.dry_run).await;
    println!("{}", report.render());
    Ok(if report.has_failures() {
        EXIT_FAILURE
    } else {
        EXIT_OK
    })
}

pub async fn status(opts: &Options, network: Option<&str>) -> eyre::Result<u8> {
    let network = network.map(normalize_network).transpose()?;
    let paths = registry_paths(opts);
    let mut entries = Vec::new();
    for path in &paths {
        let registry = Registry::json_file(path, LockOptions::default());
        entries.extend(registry.snapshot().await?.entries());
    }

    let rows = entries
        .into_iter()
        .filter(|entry| network.is_none_or(|network| entry.network == network.id))
        .map(|entry| {
            let (address, verified, state) = match &entry.state {
                EntryState::Deployed(record) => (
                    to_checksum(&record.contract_address),
                    if record.verified { "yes" } else { "no" }.to_owned(),
                    summary::status_label(record).to_owned(),
                ),
                EntryState::Undeployed => ("-".to_owned(), "-".to_owned(), "undeployed".to_owned()),
                EntryState::Malformed(reason) => {
                    ("-".to_owned(), "-".to_owned(), format!("malformed: {reason}"))
                }
            };
            format!(
                "{:<18} {:<20} {:<42} {:<8} {state}",
                entry.network, entry.contract, address, verified
            )
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        let names = paths
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{names} holds no deployments");
        return Ok(EXIT_OK);
    }
    println!(
        "{:<18} {:<20} {:<42} {:<8} STATUS",
        "NETWORK", "CONTRACT", "ADDRESS", "VERIFIED"
    );
    for row in rows {
        println!("{row}");
    }
    Ok(EXIT_OK)
}

pub async fn registry_set(
    opts: &Options,
    network: &str,
    contract: &str,
    record_path: &Path,
) -> eyre::Result<u8> {
    let network = normalize_network(network)?;
    let config = contracts::find(contract)?;
    let contract = config.contract_name;
    let raw = fs::read_to_string(record_path)
        .wrap_err_with(|| format!("failed to read {}", record_path.display()))?;
    let record: DeploymentRecord = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("{} is not a deployment record", record_path.display()))?;
    if record.network != network.id {
        bail!(
            "record is for network `{}`, not {network}",
            record.network
        );
    }
    if !record.contract_name.is_empty() && record.contract_name != contract {
        bail!(
            "record is for contract `{}`, not {contract}",
            record.contract_name
        );
    }

    let address = record.contract_address;
    let registry = Registry::json_file(&opts.registry_path(&config), LockOptions::default());
    let replaced = registry.update(network.id, contract, record).await?;
    match replaced {
        Some(previous) => println!(
            "{contract} on {network}: {} replaces {}",
            to_checksum(&address),
            to_checksum(&previous.contract_address)
        ),
        None => println!("{contract} on {network}: recorded {}", to_checksum(&address)),
    }
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbdeploy_common::{Address, H256, types::DeploymentStatus};

    fn network(name: &str) -> &'static Network {
        normalize_network(name).expect("known network")
    }

    #[test]
    fn rpc_url_resolution_order() {
        let flag = Url::parse("http://flag:8545").expect("valid url");
        let env = |key: &str| (key == "ARBDEPLOY_RPC_URL_ARBITRUM_SEPOLIA").then(|| "http://env:8545".to_owned());

        let resolved = resolve_rpc_url(network("arbitrum-sepolia"), Some(&flag), env).expect("flag");
        assert_eq!(resolved, flag);

        let resolved = resolve_rpc_url(network("arbitrumSepolia"), None, env).expect("env");
        assert_eq!(resolved.as_str(), "http://env:8545/");

        let resolved = resolve_rpc_url(network("hardhat"), None, env).expect("localhost default");
        assert_eq!(resolved.as_str(), "http://127.0.0.1:8545/");

        let err = resolve_rpc_url(network("base"), None, env).expect_err("nothing configured");
        assert!(err.to_string().contains("ARBDEPLOY_RPC_URL_BASE"));
    }

    #[test]
    fn registry_paths_follow_the_catalog_unless_overridden() {
        let mut opts = Options {
            registry: None,
            log_level: tracing::Level::INFO,
            log_color: crate::cli::LogColor::Never,
            log_dir: None,
        };
        assert_eq!(
            registry_paths(&opts),
            vec![PathBuf::from(contracts::DEFAULT_REGISTRY_FILE)]
        );

        opts.registry = Some(PathBuf::from("/srv/deploy/prod.json"));
        assert_eq!(registry_paths(&opts), vec![PathBuf::from("/srv/deploy/prod.json")]);
    }

    #[test]
    fn bookkeeping_maps_to_its_own_exit_code() {
        assert_eq!(exit_code(ErrorCategory::Bookkeeping), 2);
        assert_eq!(exit_code(ErrorCategory::OnChain), 1);
        assert_eq!(exit_code(ErrorCategory::Configuration), 1);
        assert_eq!(exit_code(ErrorCategory::Registry), 1);
    }

    #[test]
    fn pending_record_sits_next_to_the_registry() {
        let record = DeploymentRecord {
            network: "base".to_owned(),
            chain_id: 8453,
            contract_name: "MultiDexRouter".to_owned(),
            contract_address: Address::repeat_byte(0x42),
            deployer_address: Address::repeat_byte(0xde),
            transaction_hash: H256::repeat_byte(0x01),
            block_number: 1,
            timestamp: 1,
            verified: false,
            gas_used: None,
            approved_routers: Vec::new(),
            failed_routers: Vec::new(),
            minimum_profit: None,
            smoke_test_passed: None,
            status: DeploymentStatus::Deployed,
            warnings: Vec::new(),
            extra: Default::default(),
        };
        assert_eq!(
            pending_record_path(Path::new("/srv/deploy/deployments.json"), &record),
            PathBuf::from("/srv/deploy/deployments.pending.base.MultiDexRouter.json")
        );
    }

    #[tokio::test]
    async fn non_mainnet_needs_no_confirmation() {
        let confirmation = resolve_confirmation(network("sepolia"), &[])
            .await
            .expect("no prompt");
        assert_eq!(confirmation, Confirmation::None);

        let confirmation = resolve_confirmation(network("arbitrum"), &["base".to_owned(), "ARBITRUM".to_owned()])
            .await
            .expect("no prompt");
        assert!(confirmation.confirms(network("arbitrum")));
    }
}
