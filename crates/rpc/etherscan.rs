//! Source verification through the Etherscan v2 multichain API.

use std::time::Duration;

use ethereum_types::Address;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::errors::EtherscanError;

pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/v2/api";

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub chain_id: u64,
    pub address: Address,
    /// Fully qualified, e.g. `contracts/FlashLoanArbitrage.sol:FlashLoanArbitrage`.
    pub contract_name: String,
    /// e.g. `v0.8.24+commit.e11b9ed9`
    pub compiler_version: String,
    pub standard_json_input: String,
    pub constructor_args: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl EtherscanResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Queued(String),
    AlreadyVerified,
}

#[derive(Debug, PartialEq, Eq)]
enum StatusPoll {
    Pending,
    Done(VerificationOutcome),
    Failed(String),
}

fn is_already_verified(text: &str) -> bool {
    text.to_ascii_lowercase().contains("already verified")
}

fn classify_submission(response: &EtherscanResponse) -> Result<Submission, EtherscanError> {
    let result = response.result_text();
    if is_already_verified(&result) || is_already_verified(&response.message) {
        return Ok(Submission::AlreadyVerified);
    }
    if response.status == "1" {
        return Ok(Submission::Queued(result));
    }
    Err(EtherscanError::Rejected(result))
}

fn classify_status(response: &EtherscanResponse) -> StatusPoll {
    let result = response.result_text();
    let lowered = result.to_ascii_lowercase();
    if is_already_verified(&result) {
        StatusPoll::Done(VerificationOutcome::AlreadyVerified)
    } else if lowered.contains("pending") || lowered.contains("in queue") {
        StatusPoll::Pending
    } else if response.status == "1" || lowered.starts_with("pass") {
        StatusPoll::Done(VerificationOutcome::Verified)
    } else {
        StatusPoll::Failed(result)
    }
}

#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl EtherscanClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EtherscanError> {
        let api_url = Url::parse(DEFAULT_API_URL)
            .map_err(|err| EtherscanError::Http(err.to_string()))?;
        Self::with_api_url(api_key, api_url)
    }

    pub fn with_api_url(api_key: impl Into<String>, api_url: Url) -> Result<Self, EtherscanError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| EtherscanError::Http(err.to_string()))?;
        Ok(Self {
            http,
            api_url,
            api_key: api_key.into(),
            poll_interval: Duration::from_secs(5),
            max_polls: 12,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<EtherscanResponse, EtherscanError> {
        let response = request
            .send()
            .await
            .map_err(|err| EtherscanError::Http(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| EtherscanError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(EtherscanError::Http(format!("HTTP {status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|_| EtherscanError::UnexpectedResponse(body))
    }

    /// Submits the sources and polls until Etherscan reports a final status.
    pub async fn verify_source(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, EtherscanError> {
        let chain_id = request.chain_id.to_string();
        let address = format!("{:#x}", request.address);
        let constructor_args = hex::encode(&request.constructor_args);
        let form = [
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("apikey", self.api_key.as_str()),
            ("contractaddress", address.as_str()),
            ("sourceCode", request.standard_json_input.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", request.contract_name.as_str()),
            ("compilerversion", request.compiler_version.as_str()),
            // Etherscan's spelling.
            ("constructorArguements", constructor_args.as_str()),
        ];
        let submitted = self
            .send(
                self.http
                    .post(self.api_url.clone())
                    .query(&[("chainid", chain_id.as_str())])
                    .form(&form),
            )
            .await?;

        let guid = match classify_submission(&submitted)? {
            Submission::AlreadyVerified => return Ok(VerificationOutcome::AlreadyVerified),
            Submission::Queued(guid) => guid,
        };
        info!(%address, %guid, "Verification submitted");

        for poll in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let status = self
                .send(self.http.get(self.api_url.clone()).query(&[
                    ("chainid", chain_id.as_str()),
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid.as_str()),
                    ("apikey", self.api_key.as_str()),
                ]))
                .await?;
            match classify_status(&status) {
                StatusPoll::Pending => debug!(%guid, poll, "Verification pending"),
                StatusPoll::Done(outcome) => return Ok(outcome),
                StatusPoll::Failed(reason) => return Err(EtherscanError::Failed(reason)),
            }
        }
        Err(EtherscanError::StillPending {
            guid,
            polls: self.max_polls,
        })
    }
}
