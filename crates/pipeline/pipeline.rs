//! Deployment pipeline: preflight, cost estimation, deployment, post-deploy
//! configuration, source verification, smoke tests and registry bookkeeping
//! for one `(contract type, network)` pair, plus the batch driver that walks
//! a manifest of such pairs.

pub mod artifacts;
pub mod batch;
pub mod chain;
pub mod config;
pub mod configurator;
pub mod contracts;
pub mod errors;
pub mod estimator;
pub mod executor;
pub mod orchestrator;
pub mod preflight;
pub mod smoke;
pub mod summary;
#[cfg(test)]
mod test_utils;
pub mod verification;

pub use chain::{ChainClient, RpcChainClient};
pub use config::{Confirmation, PipelineConfig, PipelineOptions, PostDeployStages};
pub use errors::{ErrorCategory, PipelineError};
pub use orchestrator::{Pipeline, PipelineReport, Stage, Warning};
pub use verification::{RetryPolicy, Verifier};
