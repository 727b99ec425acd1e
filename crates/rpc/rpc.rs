pub mod client;
pub mod errors;
pub mod etherscan;
pub mod signer;
pub mod transaction;
pub mod types;
mod utils;

pub use client::{CallRequest, EthClient, RpcConfig};
pub use errors::{EthClientError, EtherscanError, RpcError, SignerError};
pub use etherscan::{EtherscanClient, VerificationOutcome, VerificationRequest};
pub use signer::LocalSigner;
pub use transaction::Eip1559Transaction;
pub use types::{BlockTag, FeeData, Receipt};
