use ethereum_types::{Address, H256, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Pending,
    Number(u64),
}

impl BlockTag {
    pub fn to_param(self) -> String {
        match self {
            BlockTag::Latest => "latest".to_owned(),
            BlockTag::Pending => "pending".to_owned(),
            BlockTag::Number(number) => format!("{number:#x}"),
        }
    }
}

/// Fee parameters fetched fresh for each transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    pub base_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    /// `2 * base fee + tip`, enough to survive a few full blocks.
    pub max_fee_per_gas: U256,
}

impl FeeData {
    pub fn new(base_fee_per_gas: U256, max_priority_fee_per_gas: U256) -> Self {
        Self {
            base_fee_per_gas,
            max_priority_fee_per_gas,
            max_fee_per_gas: base_fee_per_gas
                .saturating_mul(U256::from(2))
                .saturating_add(max_priority_fee_per_gas),
        }
    }

    /// Upper bound on what `gas_limit` gas can cost at these fees.
    pub fn max_cost(&self, gas_limit: u64) -> U256 {
        self.max_fee_per_gas.saturating_mul(U256::from(gas_limit))
    }
}

/// Subset of `eth_getTransactionReceipt` the deployer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: bool,
    pub contract_address: Option<Address>,
}
