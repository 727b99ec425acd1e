//! Source verification with bounded, exponentially backed-off retries.

use std::time::Duration;

use arbdeploy_common::{Address, networks::Network};
use arbdeploy_rpc::{EtherscanClient, EtherscanError, VerificationOutcome, VerificationRequest};
use tracing::{info, warn};

use crate::artifacts::VerificationSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationJob {
    pub network: &'static Network,
    pub address: Address,
    pub contract_name: String,
    pub constructor_args: Vec<u8>,
    pub source: Option<VerificationSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    Verified,
    AlreadyVerified,
    /// Verification was not attempted; the reason goes into the summary.
    Skipped(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Worth retrying: explorer not indexed yet, rate limits, network trouble.
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
}

impl VerifyError {
    fn message(&self) -> &str {
        match self {
            VerifyError::Transient(message) | VerifyError::Permanent(message) => message,
        }
    }
}

#[async_trait::async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, job: &VerificationJob) -> Result<VerifyResponse, VerifyError>;
}

/// Used when no explorer API key is configured.
#[derive(Debug, Clone)]
pub struct NoopVerifier {
    pub reason: String,
}

#[async_trait::async_trait]
impl Verifier for NoopVerifier {
    async fn verify(&self, _job: &VerificationJob) -> Result<VerifyResponse, VerifyError> {
        Ok(VerifyResponse::Skipped(self.reason.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: EtherscanClient,
}

impl EtherscanVerifier {
    pub fn new(client: EtherscanClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Verifier for EtherscanVerifier {
    async fn verify(&self, job: &VerificationJob) -> Result<VerifyResponse, VerifyError> {
        if !job.network.explorer_supported {
            return Ok(VerifyResponse::Skipped(format!(
                "{} has no supported block explorer",
                job.network
            )));
        }
        let Some(source) = &job.source else {
            return Ok(VerifyResponse::Skipped(
                "no compiler input found next to the artifact".to_owned(),
            ));
        };
        let request = VerificationRequest {
            chain_id: job.network.chain_id,
            address: job.address,
            contract_name: source.fully_qualified_name.clone(),
            compiler_version: source.compiler_version.clone(),
            standard_json_input: source.standard_json_input.clone(),
            constructor_args: job.constructor_args.clone(),
        };
        match self.client.verify_source(&request).await {
            Ok(VerificationOutcome::Verified) => Ok(VerifyResponse::Verified),
            Ok(VerificationOutcome::AlreadyVerified) => Ok(VerifyResponse::AlreadyVerified),
            Err(err @ EtherscanError::Failed(_)) => Err(VerifyError::Permanent(err.to_string())),
            Err(err) => Err(VerifyError::Transient(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(30),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, for `attempt >= 1`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(self.factor.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    AlreadyVerified,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub attempts: u32,
    /// Delays slept between attempts, in order.
    pub delays: Vec<Duration>,
}

impl VerificationReport {
    pub fn verified(&self) -> bool {
        matches!(
            self.status,
            VerificationStatus::Verified | VerificationStatus::AlreadyVerified
        )
    }
}

fn is_already_verified(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already verified")
}

/// Drives a [`Verifier`] under a [`RetryPolicy`]. Exhaustion is reported,
/// never raised.
pub async fn verify_with_retry(
    verifier: &dyn Verifier,
    job: &VerificationJob,
    policy: &RetryPolicy,
) -> VerificationReport {
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match verifier.verify(job).await {
            Ok(VerifyResponse::Verified) => {
                info!(contract = %job.contract_name, attempt, "Source verified");
                return report(VerificationStatus::Verified, attempt, delays);
            }
            Ok(VerifyResponse::AlreadyVerified) => {
                info!(contract = %job.contract_name, "Source already verified");
                return report(VerificationStatus::AlreadyVerified, attempt, delays);
            }
            Ok(VerifyResponse::Skipped(reason)) => {
                info!(contract = %job.contract_name, %reason, "Source verification skipped");
                return report(VerificationStatus::Skipped(reason), attempt, delays);
            }
            Err(err) if is_already_verified(err.message()) => {
                info!(contract = %job.contract_name, "Source already verified");
                return report(VerificationStatus::AlreadyVerified, attempt, delays);
            }
            Err(err) => err,
        };

        if matches!(error, VerifyError::Permanent(_)) || attempt >= max_attempts {
            warn!(
                contract = %job.contract_name,
                attempts = attempt,
                %error,
                "Source verification failed"
            );
            return report(VerificationStatus::Failed(error.to_string()), attempt, delays);
        }

        let delay = policy.delay_after(attempt);
        warn!(
            contract = %job.contract_name,
            attempt,
            retry_in_secs = delay.as_secs(),
            %error,
            "Source verification attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        delays.push(delay);
    }
}

fn report(status: VerificationStatus, attempts: u32, delays: Vec<Duration>) -> VerificationReport {
    VerificationReport {
        status,
        attempts,
        delays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbdeploy_common::networks::normalize_network;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Result<VerifyResponse, VerifyError>>>);

    #[async_trait::async_trait]
    impl Verifier for Scripted {
        async fn verify(&self, _job: &VerificationJob) -> Result<VerifyResponse, VerifyError> {
            let mut script = self.0.lock().expect("script lock");
            if script.is_empty() {
                return Err(VerifyError::Transient("script exhausted".to_owned()));
            }
            script.remove(0)
        }
    }

    fn job() -> VerificationJob {
        VerificationJob {
            network: normalize_network("sepolia").expect("known network"),
            address: Address::repeat_byte(0xaa),
            contract_name: "MultiDexRouter".to_owned(),
            constructor_args: Vec::new(),
            source: None,
        }
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(2), Duration::from_secs(60));
        assert_eq!(policy.delay_after(3), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let verifier = Scripted(Mutex::new(vec![Err(VerifyError::Permanent(
            "Fail - Unable to verify".to_owned(),
        ))]));
        let report = verify_with_retry(&verifier, &job(), &RetryPolicy::default()).await;
        assert_eq!(report.attempts, 1);
        assert!(report.delays.is_empty());
        assert!(matches!(report.status, VerificationStatus::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_reported_not_raised() {
        let verifier = Scripted(Mutex::new(Vec::new()));
        let report = verify_with_retry(&verifier, &job(), &RetryPolicy::default()).await;
        assert_eq!(report.attempts, 3);
        assert_eq!(
            report.delays,
            vec![Duration::from_secs(30), Duration::from_secs(60)]
        );
        assert!(!report.verified());
    }

    #[tokio::test]
    async fn noop_verifier_skips() {
        let verifier = NoopVerifier {
            reason: "no API key".to_owned(),
        };
        let report = verify_with_retry(&verifier, &job(), &RetryPolicy::default()).await;
        assert_eq!(report.status, VerificationStatus::Skipped("no API key".to_owned()));
    }
}
