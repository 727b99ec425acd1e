pub use ethereum_types::{Address, H160, H256, U256};

pub mod calldata;
pub mod networks;
pub mod serde_utils;
pub mod types;
pub mod utils;
