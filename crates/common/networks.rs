//! Canonical network identifiers, aliases and the static protocol address book.

use std::fmt;

use ethereum_types::{Address, H160};
use hex_literal::hex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown network `{name}` (known networks: {known})")]
    Unknown { name: String, known: String },
    #[error("no {key} address configured for network `{network}`; set it explicitly")]
    MissingAddress { network: String, key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// Canonical identifier, also the top-level key in the registry.
    pub id: &'static str,
    pub chain_id: u64,
    /// Real-value networks: deployments need explicit operator confirmation
    /// and a non-zero minimum profit.
    pub mainnet_class: bool,
    pub native_symbol: &'static str,
    /// Whether the Etherscan v2 multichain API can verify sources on this chain.
    pub explorer_supported: bool,
}

impl Network {
    /// Environment variable holding this network's RPC endpoint.
    pub fn rpc_url_env_key(&self) -> String {
        format!(
            "ARBDEPLOY_RPC_URL_{}",
            self.id.to_ascii_uppercase().replace('-', "_")
        )
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

const fn network(
    id: &'static str,
    chain_id: u64,
    mainnet_class: bool,
    native_symbol: &'static str,
    explorer_supported: bool,
) -> Network {
    Network {
        id,
        chain_id,
        mainnet_class,
        native_symbol,
        explorer_supported,
    }
}

pub static NETWORKS: &[Network] = &[
    network("ethereum", 1, true, "ETH", true),
    network("arbitrum", 42161, true, "ETH", true),
    network("optimism", 10, true, "ETH", true),
    network("base", 8453, true, "ETH", true),
    network("polygon", 137, true, "POL", true),
    network("bsc", 56, true, "BNB", true),
    network("avalanche", 43114, true, "AVAX", true),
    network("sepolia", 11155111, false, "ETH", true),
    network("arbitrum-sepolia", 421614, false, "ETH", true),
    network("base-sepolia", 84532, false, "ETH", true),
    network("localhost", 31337, false, "ETH", false),
];

const ALIASES: &[(&str, &str)] = &[
    ("mainnet", "ethereum"),
    ("eth", "ethereum"),
    ("arbitrum-one", "arbitrum"),
    ("arbitrumone", "arbitrum"),
    ("arb", "arbitrum"),
    ("op", "optimism"),
    ("optimism-mainnet", "optimism"),
    ("matic", "polygon"),
    ("polygon-pos", "polygon"),
    ("bnb", "bsc"),
    ("binance", "bsc"),
    ("avax", "avalanche"),
    ("arbitrumsepolia", "arbitrum-sepolia"),
    ("basesepolia", "base-sepolia"),
    ("hardhat", "localhost"),
    ("anvil", "localhost"),
];

/// Resolves a network name or alias to its canonical entry.
///
/// Matching is case-insensitive and treats `_` like `-`, so `arbitrumOne`,
/// `Arbitrum_One` and `arbitrum-one` all resolve to `arbitrum`.
pub fn normalize_network(name: &str) -> Result<&'static Network, NetworkError> {
    let lowered = name.trim().to_ascii_lowercase().replace('_', "-");
    let canonical = ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(lowered.as_str());

    NETWORKS
        .iter()
        .find(|network| network.id == canonical)
        .ok_or_else(|| NetworkError::Unknown {
            name: name.to_owned(),
            known: NETWORKS
                .iter()
                .map(|network| network.id)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Canonical protocol contracts the deployed contracts are wired against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolAddresses {
    pub aave_addresses_provider: Option<Address>,
    pub balancer_vault: Option<Address>,
    pub wrapped_native: Option<Address>,
    /// DEX routers approved on arbitrage contracts, in approval order.
    pub routers: Vec<(&'static str, Address)>,
}

impl ProtocolAddresses {
    pub fn require_aave_addresses_provider(&self, network: &Network) -> Result<Address, NetworkError> {
        required(self.aave_addresses_provider, network, "Aave PoolAddressesProvider")
    }

    pub fn require_balancer_vault(&self, network: &Network) -> Result<Address, NetworkError> {
        required(self.balancer_vault, network, "Balancer Vault")
    }

    pub fn require_wrapped_native(&self, network: &Network) -> Result<Address, NetworkError> {
        required(self.wrapped_native, network, "wrapped native token")
    }

    pub fn router_addresses(&self) -> Vec<Address> {
        self.routers.iter().map(|(_, address)| *address).collect()
    }
}

fn required(
    value: Option<Address>,
    network: &Network,
    key: &'static str,
) -> Result<Address, NetworkError> {
    value.ok_or_else(|| NetworkError::MissingAddress {
        network: network.id.to_owned(),
        key,
    })
}

const BALANCER_V2_VAULT: Address = H160(hex!("ba12222222228d8ba445958a75a0704d566bf2c8"));
const AAVE_V3_PROVIDER_L2: Address = H160(hex!("a97684ead0e402dc232d5a977953df7ecbab3cdb"));
const UNISWAP_SWAP_ROUTER_02: Address = H160(hex!("68b3465833fb72a70ecdf485e0e4c7bd8665fc45"));
const SUSHISWAP_ROUTER_L2: Address = H160(hex!("1b02da8cb0d097eb8d57a175b88c7d8b47997506"));

/// Built-in address book keyed by canonical network id.
pub fn protocol_addresses(network: &Network) -> ProtocolAddresses {
    match network.id {
        "ethereum" => ProtocolAddresses {
            aave_addresses_provider: Some(H160(hex!("2f39d218133afab8f2b819b1066c7e434ad94e9e"))),
            balancer_vault: Some(BALANCER_V2_VAULT),
            wrapped_native: Some(H160(hex!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"))),
            routers: vec![
                ("uniswap-v2", H160(hex!("7a250d5630b4cf539739df2c5dacb4c659f2488d"))),
                ("uniswap-v3", UNISWAP_SWAP_ROUTER_02),
                ("sushiswap", H160(hex!("d9e1ce17f2641f24ae83637ab66a2cca9c378b9f"))),
            ],
        },
        "arbitrum" => ProtocolAddresses {
            aave_addresses_provider: Some(AAVE_V3_PROVIDER_L2),
            balancer_vault: Some(BALANCER_V2_VAULT),
            wrapped_native: Some(H160(hex!("82af49447d8a07e3bd95bd0d56f35241523fbab1"))),
            routers: vec![
                ("uniswap-v3", UNISWAP_SWAP_ROUTER_02),
                ("sushiswap", SUSHISWAP_ROUTER_L2),
            ],
        },
        "optimism" => ProtocolAddresses {
            aave_addresses_provider: Some(AAVE_V3_PROVIDER_L2),
            balancer_vault: Some(BALANCER_V2_VAULT),
            wrapped_native: Some(H160(hex!("4200000000000000000000000000000000000006"))),
            routers: vec![("uniswap-v3", UNISWAP_SWAP_ROUTER_02)],
        },
        "base" => ProtocolAddresses {
            aave_addresses_provider: Some(H160(hex!("e20fcbdbffc4dd138ce8b2e6fbb6cb49777ad64d"))),
            balancer_vault: Some(BALANCER_V2_VAULT),
            wrapped_native: Some(H160(hex!("4200000000000000000000000000000000000006"))),
            routers: vec![("uniswap-v3", H160(hex!("2626664c2603336e57b271c5c0b26f421741e481")))],
        },
        "polygon" => ProtocolAddresses {
            aave_addresses_provider: Some(AAVE_V3_PROVIDER_L2),
            balancer_vault: Some(BALANCER_V2_VAULT),
            wrapped_native: Some(H160(hex!("0d500b1d8e8ef31e21c99d1db9a6444d3adf1270"))),
            routers: vec![
                ("uniswap-v3", UNISWAP_SWAP_ROUTER_02),
                ("sushiswap", SUSHISWAP_ROUTER_L2),
            ],
        },
        "bsc" => ProtocolAddresses {
            aave_addresses_provider: None,
            balancer_vault: None,
            wrapped_native: Some(H160(hex!("bb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c"))),
            routers: vec![("pancakeswap-v2", H160(hex!("10ed43c718714eb63d5aa57b78b54704e256024e")))],
        },
        "avalanche" => ProtocolAddresses {
            aave_addresses_provider: Some(AAVE_V3_PROVIDER_L2),
            balancer_vault: Some(BALANCER_V2_VAULT),
            wrapped_native: Some(H160(hex!("b31f66aa3c1e785363f0875a1b74e27b85fd66c7"))),
            routers: vec![],
        },
        "sepolia" => ProtocolAddresses {
            aave_addresses_provider: Some(H160(hex!("012bac54348c0e635dcac9d5fb99f06f24136c9a"))),
            balancer_vault: None,
            wrapped_native: Some(H160(hex!("fff9976782d46cc05630d1f6ebab18b2324d6b14"))),
            routers: vec![("uniswap-v3", H160(hex!("3bfa4769fb09eefc5a80d6e87c3b9c650f7ae48e")))],
        },
        _ => ProtocolAddresses::default(),
    }
}
