use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use arbdeploy_common::{Address, U256, utils::parse_address};
use arbdeploy_pipeline::{
    PipelineConfig, PipelineOptions, RetryPolicy,
    config::{AddressOverrides, Confirmation},
};
use clap::{ArgAction, Parser as ClapParser, Subcommand as ClapSubcommand};
use tracing::Level;
use url::Url;

use crate::{
    commands::{batch, deploy, registry_set, status},
    initializers::init_tracing,
};

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(
    name = "arbdeploy",
    version,
    about = "Deploys the arbitrage contracts and keeps the deployment registry"
)]
pub struct CLI {
    #[command(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Subcommand,
}

/// Options shared by every subcommand.
#[derive(ClapParser, Debug, Clone)]
pub struct Options {
    #[arg(
        long = "registry",
        global = true,
        value_name = "REGISTRY_FILE",
        help = "Path of the JSON deployment registry.",
        long_help = "Overrides the registry file each contract type records into.",
        help_heading = "Registry options",
        env = "ARBDEPLOY_REGISTRY"
    )]
    pub registry: Option<PathBuf>,
    #[arg(
        long = "log.level",
        global = true,
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "ARBDEPLOY_LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error. RUST_LOG overrides it.",
        help_heading = "Log options"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        global = true,
        default_value_t = LogColor::Auto,
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto, always, never",
        help_heading = "Log options",
        env = "ARBDEPLOY_LOG_COLOR"
    )]
    pub log_color: LogColor,
    #[arg(
        long = "log.dir",
        global = true,
        value_name = "LOG_DIR",
        help = "Directory to store log files.",
        help_heading = "Log options",
        env = "ARBDEPLOY_LOG_DIR"
    )]
    pub log_dir: Option<PathBuf>,
}

impl Options {
    /// `--registry` when given, else the registry file of the contract type.
    pub fn registry_path(&self, config: &PipelineConfig) -> PathBuf {
        self.registry
            .clone()
            .unwrap_or_else(|| PathBuf::from(config.registry_file))
    }
}

#[derive(ClapParser, Debug, Clone)]
pub struct DeployOptions {
    #[arg(
        value_name = "CONTRACT",
        help = "Contract type to deploy: FlashLoanArbitrage, MultiDexRouter or ProfitVault."
    )]
    pub contract: String,
    #[arg(
        long = "network",
        value_name = "NETWORK",
        help = "Target network name or alias (e.g. arbitrum, arb, sepolia).",
        help_heading = "Eth options",
        env = "ARBDEPLOY_NETWORK"
    )]
    pub network: String,
    #[arg(
        long = "eth-rpc-url",
        value_name = "RPC_URL",
        help = "JSON-RPC endpoint of the target network.",
        long_help = "Falls back to ARBDEPLOY_RPC_URL_<NETWORK> (upper case, `-` as `_`) and, for localhost, to http://127.0.0.1:8545.",
        help_heading = "Eth options",
        env = "ARBDEPLOY_RPC_URL"
    )]
    pub rpc_url: Option<Url>,
    #[arg(
        long = "max-fee-per-gas",
        value_name = "WEI",
        value_parser = parse_u256,
        help = "Abort if the network's max fee per gas exceeds this cap.",
        help_heading = "Eth options",
        env = "ARBDEPLOY_MAX_FEE_PER_GAS"
    )]
    pub max_fee_per_gas: Option<U256>,
    #[arg(
        long = "gas-buffer",
        default_value_t = 20,
        value_name = "PERCENT",
        help = "Extra gas on top of the estimate for the deployment transaction.",
        help_heading = "Eth options",
        env = "ARBDEPLOY_GAS_BUFFER"
    )]
    pub gas_buffer_percent: u64,
    #[arg(
        long = "receipt-timeout",
        default_value_t = 300,
        value_name = "SECONDS",
        help = "How long to wait for each transaction to be mined.",
        help_heading = "Eth options",
        env = "ARBDEPLOY_RECEIPT_TIMEOUT"
    )]
    pub receipt_timeout_secs: u64,
    #[arg(
        long = "private-key",
        value_name = "HEX",
        help = "Deployer secret key.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_PRIVATE_KEY",
        hide_env_values = true
    )]
    pub private_key: Option<String>,
    #[arg(
        long = "confirm",
        value_name = "NETWORK",
        value_delimiter = ',',
        help = "Canonical id of a mainnet-class network this run may deploy to.",
        long_help = "Comma separated. Without a matching token the operator is prompted when stdin is a terminal, otherwise the run is refused.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_CONFIRM"
    )]
    pub confirm: Vec<String>,
    #[arg(
        long = "min-profit",
        value_name = "WEI",
        value_parser = parse_u256,
        help = "Minimum profit threshold set on FlashLoanArbitrage. Required and non-zero on mainnet-class networks.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_MIN_PROFIT"
    )]
    pub min_profit: Option<U256>,
    #[arg(
        long = "routers",
        value_name = "ADDRESS_LIST",
        value_delimiter = ',',
        value_parser = parse_address_arg,
        help = "Routers to approve. Defaults to the network's address book.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_ROUTERS"
    )]
    pub routers: Option<Vec<Address>>,
    #[arg(
        long = "allow-redeploy",
        action = ArgAction::SetTrue,
        help = "Deploy even if the registry already holds this contract on this network.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_ALLOW_REDEPLOY"
    )]
    pub allow_redeploy: bool,
    #[arg(
        long = "treasury",
        value_name = "ADDRESS",
        value_parser = parse_address_arg,
        help = "ProfitVault treasury. Defaults to the deployer.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_TREASURY"
    )]
    pub treasury: Option<Address>,
    #[arg(
        long = "fee-bps",
        default_value_t = 500,
        value_name = "BASIS_POINTS",
        value_parser = clap::value_parser!(u16).range(0..=10_000),
        help = "ProfitVault fee in basis points.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_FEE_BPS"
    )]
    pub fee_bps: u16,
    #[arg(
        long = "aave-addresses-provider",
        value_name = "ADDRESS",
        value_parser = parse_address_arg,
        help_heading = "Deployer options",
        env = "ARBDEPLOY_AAVE_ADDRESSES_PROVIDER"
    )]
    pub aave_addresses_provider: Option<Address>,
    #[arg(
        long = "balancer-vault",
        value_name = "ADDRESS",
        value_parser = parse_address_arg,
        help_heading = "Deployer options",
        env = "ARBDEPLOY_BALANCER_VAULT"
    )]
    pub balancer_vault: Option<Address>,
    #[arg(
        long = "wrapped-native",
        value_name = "ADDRESS",
        value_parser = parse_address_arg,
        help_heading = "Deployer options",
        env = "ARBDEPLOY_WRAPPED_NATIVE"
    )]
    pub wrapped_native: Option<Address>,
    #[arg(
        long = "artifacts-dir",
        default_value = ".",
        value_name = "PROJECT_DIR",
        help = "Hardhat or Foundry project root holding the compiled artifacts.",
        help_heading = "Deployer options",
        env = "ARBDEPLOY_ARTIFACTS_DIR"
    )]
    pub artifacts_dir: PathBuf,
    #[arg(
        long = "etherscan-api-key",
        value_name = "KEY",
        help = "Etherscan v2 API key. Verification is skipped without it.",
        help_heading = "Verification options",
        env = "ARBDEPLOY_ETHERSCAN_API_KEY",
        hide_env_values = true
    )]
    pub etherscan_api_key: Option<String>,
    #[arg(
        long = "verify.attempts",
        default_value_t = 3,
        value_name = "ATTEMPTS",
        help_heading = "Verification options",
        env = "ARBDEPLOY_VERIFY_ATTEMPTS"
    )]
    pub verify_attempts: u32,
    #[arg(
        long = "verify.initial-delay",
        default_value_t = 30,
        value_name = "SECONDS",
        help = "Delay before the first retry; doubles after each failed attempt.",
        help_heading = "Verification options",
        env = "ARBDEPLOY_VERIFY_INITIAL_DELAY"
    )]
    pub verify_initial_delay_secs: u64,
}

impl DeployOptions {
    /// Pipeline knobs; `confirmation` is resolved separately.
    pub fn pipeline_options(&self, confirmation: Confirmation) -> PipelineOptions {
        PipelineOptions {
            confirmation,
            minimum_profit: self.min_profit,
            routers: self.routers.clone(),
            overrides: AddressOverrides {
                aave_addresses_provider: self.aave_addresses_provider,
                balancer_vault: self.balancer_vault,
                wrapped_native: self.wrapped_native,
            },
            treasury: self.treasury,
            fee_bps: self.fee_bps,
            allow_redeploy: self.allow_redeploy,
            gas_buffer_percent: self.gas_buffer_percent,
            max_fee_per_gas_cap: self.max_fee_per_gas,
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            verification_retry: RetryPolicy {
                max_attempts: self.verify_attempts,
                initial_delay: Duration::from_secs(self.verify_initial_delay_secs),
                ..Default::default()
            },
        }
    }
}

#[derive(ClapParser, Debug, Clone)]
pub struct BatchOptions {
    #[arg(
        long = "networks",
        value_name = "NETWORK_LIST",
        value_delimiter = ',',
        help = "Only deploy to these networks.",
        help_heading = "Batch options",
        env = "ARBDEPLOY_NETWORKS"
    )]
    pub networks: Vec<String>,
    #[arg(
        long = "contracts",
        value_name = "CONTRACT_LIST",
        value_delimiter = ',',
        help = "Only deploy these contract types.",
        help_heading = "Batch options",
        env = "ARBDEPLOY_CONTRACTS"
    )]
    pub contracts: Vec<String>,
    #[arg(
        long = "dry-run",
        action = ArgAction::SetTrue,
        help = "Print the plan without deploying anything.",
        help_heading = "Batch options",
        env = "ARBDEPLOY_DRY_RUN"
    )]
    pub dry_run: bool,
    #[arg(
        long = "manifest",
        value_name = "MANIFEST_FILE",
        help = "JSON array of {\"contract\", \"network\"} pairs. Defaults to the built-in manifest.",
        help_heading = "Batch options",
        env = "ARBDEPLOY_MANIFEST"
    )]
    pub manifest: Option<PathBuf>,
}

#[allow(clippy::large_enum_variant)]
#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(name = "deploy", about = "Run the deployment pipeline for one contract on one network")]
    Deploy(DeployOptions),
    #[command(
        name = "batch",
        about = "Deploy every manifest pair not yet in the registry, one child process per pair"
    )]
    Batch(BatchOptions),
    #[command(name = "status", about = "Print the deployment registry")]
    Status {
        #[arg(long = "network", value_name = "NETWORK")]
        network: Option<String>,
    },
    #[command(name = "registry", about = "Edit the deployment registry by hand")]
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
}

#[derive(ClapSubcommand)]
pub enum RegistryCommand {
    #[command(
        name = "set",
        about = "Write a deployment record into the registry under the registry lock"
    )]
    Set {
        #[arg(long = "network", value_name = "NETWORK")]
        network: String,
        #[arg(long = "contract", value_name = "CONTRACT")]
        contract: String,
        #[arg(
            long = "record",
            value_name = "RECORD_FILE",
            help = "JSON deployment record, e.g. the pending record written after a bookkeeping failure."
        )]
        record: PathBuf,
    },
}

impl Subcommand {
    /// Runs the command and returns the process exit code.
    pub async fn run(self, opts: &Options) -> eyre::Result<u8> {
        let _guard = init_tracing(opts)?;
        match self {
            Subcommand::Deploy(deploy_opts) => deploy(opts, deploy_opts).await,
            Subcommand::Batch(batch_opts) => batch(opts, batch_opts).await,
            Subcommand::Status { network } => status(opts, network.as_deref()).await,
            Subcommand::Registry {
                command:
                    RegistryCommand::Set {
                        network,
                        contract,
                        record,
                    },
            } => registry_set(opts, &network, &contract, &record).await,
        }
    }
}

fn parse_u256(raw: &str) -> Result<U256, String> {
    U256::from_dec_str(raw.trim()).map_err(|err| format!("invalid wei amount `{raw}`: {err:?}"))
}

fn parse_address_arg(raw: &str) -> Result<Address, String> {
    parse_address(raw).map_err(|err| err.to_string())
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LogColor {
    #[default]
    Auto,
    Always,
    Never,
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => write!(f, "auto"),
            LogColor::Always => write!(f, "always"),
            LogColor::Never => write!(f, "never"),
        }
    }
}

impl FromStr for LogColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(LogColor::Auto),
            "always" => Ok(LogColor::Always),
            "never" => Ok(LogColor::Never),
            _ => Err(format!(
                "Invalid log color '{s}'. Expected: auto, always, or never"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        CLI::command().debug_assert();
    }

    #[test]
    fn deploy_flags_become_pipeline_options() {
        let cli = CLI::try_parse_from([
            "arbdeploy",
            "deploy",
            "FlashLoanArbitrage",
            "--network",
            "arb",
            "--min-profit",
            "1000000000000000",
            "--routers",
            "0x1111111111111111111111111111111111111111,0x2222222222222222222222222222222222222222",
            "--verify.attempts",
            "5",
        ])
        .expect("valid arguments");
        let Subcommand::Deploy(deploy) = cli.command else {
            panic!("expected deploy");
        };
        let options = deploy.pipeline_options(Confirmation::None);
        assert_eq!(options.minimum_profit, Some(U256::from(1_000_000_000_000_000u64)));
        assert_eq!(options.routers.map(|routers| routers.len()), Some(2));
        assert_eq!(options.verification_retry.max_attempts, 5);
        assert_eq!(options.verification_retry.initial_delay, Duration::from_secs(30));
        assert_eq!(options.gas_buffer_percent, 20);
        assert!(!options.allow_redeploy);
    }

    #[test]
    fn rejects_bad_fee_and_address() {
        assert!(
            CLI::try_parse_from([
                "arbdeploy", "deploy", "ProfitVault", "--network", "sepolia", "--fee-bps", "10001",
            ])
            .is_err()
        );
        assert!(
            CLI::try_parse_from([
                "arbdeploy", "deploy", "ProfitVault", "--network", "sepolia", "--treasury", "0x12",
            ])
            .is_err()
        );
    }

    #[test]
    fn registry_is_a_global_option() {
        let cli = CLI::try_parse_from(["arbdeploy", "status", "--registry", "other.json"])
            .expect("valid arguments");
        assert_eq!(cli.opts.registry, Some(PathBuf::from("other.json")));
        let config = arbdeploy_pipeline::contracts::find("ProfitVault").expect("catalogued");
        assert_eq!(cli.opts.registry_path(&config), PathBuf::from("other.json"));
    }

    #[test]
    fn registry_defaults_to_the_contract_registry_file() {
        let cli = CLI::try_parse_from(["arbdeploy", "status"]).expect("valid arguments");
        if std::env::var_os("ARBDEPLOY_REGISTRY").is_some() {
            return;
        }
        let config = arbdeploy_pipeline::contracts::find("MultiDexRouter").expect("catalogued");
        assert_eq!(cli.opts.registry, None);
        assert_eq!(
            cli.opts.registry_path(&config),
            PathBuf::from(config.registry_file)
        );
    }
}
