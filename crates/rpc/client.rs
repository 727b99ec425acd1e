//! Async JSON-RPC client for the deployment target chain.
//!
//! Transient failures (connection errors, timeouts, HTTP 429/502/503/504) are
//! retried with exponential backoff; HTTP 429 honours `Retry-After`.

use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    errors::{EthClientError, RpcError},
    types::{BlockTag, Receipt},
    utils::{
        hex_decode, parse_base_fee, parse_block_timestamp, parse_bytes, parse_h256,
        parse_receipt, parse_u64, parse_u256,
    },
};

#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// TCP connect timeout (default: 10s).
    pub connect_timeout: Duration,
    /// Retries after the first attempt for transient errors (default: 3).
    pub max_retries: u32,
    /// Base backoff duration, doubled on each retry (default: 1s).
    pub base_backoff: Duration,
    /// Interval between receipt polls (default: 2s).
    pub receipt_poll_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EthClient {
    http: reqwest::Client,
    url: Url,
    config: RpcConfig,
}

/// Transaction fields for `eth_estimateGas` and `eth_call`.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    pub from: Option<Address>,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub data: Vec<u8>,
    pub value: U256,
}

impl CallRequest {
    fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        if let Some(from) = self.from {
            object.insert("from".into(), json!(format!("{from:#x}")));
        }
        if let Some(to) = self.to {
            object.insert("to".into(), json!(format!("{to:#x}")));
        }
        object.insert("data".into(), json!(format!("0x{}", hex::encode(&self.data))));
        if !self.value.is_zero() {
            object.insert("value".into(), json!(format!("{:#x}", self.value)));
        }
        Value::Object(object)
    }
}

impl EthClient {
    pub fn new(url: &str) -> Result<Self, EthClientError> {
        Self::new_with_config(url, RpcConfig::default())
    }

    pub fn new_with_config(url: &str, config: RpcConfig) -> Result<Self, EthClientError> {
        let url = Url::parse(url).map_err(|_| EthClientError::InvalidUrl(url.to_owned()))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| EthClientError::HttpClient(err.to_string()))?;
        Ok(Self { http, url, config })
    }

    pub async fn chain_id(&self) -> Result<u64, EthClientError> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        Ok(parse_u64("eth_chainId", "result", &result)?)
    }

    pub async fn get_balance(&self, address: Address, block: BlockTag) -> Result<U256, EthClientError> {
        let result = self
            .rpc_call("eth_getBalance", json!([format!("{address:#x}"), block.to_param()]))
            .await?;
        Ok(parse_u256("eth_getBalance", "result", &result)?)
    }

    pub async fn get_nonce(&self, address: Address, block: BlockTag) -> Result<u64, EthClientError> {
        let result = self
            .rpc_call(
                "eth_getTransactionCount",
                json!([format!("{address:#x}"), block.to_param()]),
            )
            .await?;
        Ok(parse_u64("eth_getTransactionCount", "result", &result)?)
    }

    pub async fn gas_price(&self) -> Result<U256, EthClientError> {
        let result = self.rpc_call("eth_gasPrice", json!([])).await?;
        Ok(parse_u256("eth_gasPrice", "result", &result)?)
    }

    /// Node-suggested tip; nodes without `eth_maxPriorityFeePerGas` fall back
    /// to the legacy gas price.
    pub async fn max_priority_fee_per_gas(&self) -> Result<U256, EthClientError> {
        match self.rpc_call("eth_maxPriorityFeePerGas", json!([])).await {
            Ok(result) => Ok(parse_u256("eth_maxPriorityFeePerGas", "result", &result)?),
            Err(err @ RpcError::JsonRpcError { .. }) => {
                debug!(%err, "eth_maxPriorityFeePerGas unsupported, using eth_gasPrice");
                self.gas_price().await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Base fee of the latest block; zero on chains without EIP-1559.
    pub async fn base_fee(&self) -> Result<U256, EthClientError> {
        let result = self
            .rpc_call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        Ok(parse_base_fee(&result)?.unwrap_or_default())
    }

    pub async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, EthClientError> {
        match self.rpc_call("eth_estimateGas", json!([request.to_json()])).await {
            Ok(result) => Ok(parse_u64("eth_estimateGas", "result", &result)?),
            Err(err) => match err.node_message() {
                Some(message) => Err(EthClientError::EstimateGas(message.to_owned())),
                None => Err(err.into()),
            },
        }
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, EthClientError> {
        let params = json!([format!("0x{}", hex::encode(raw))]);
        match self.rpc_call("eth_sendRawTransaction", params).await {
            Ok(result) => Ok(parse_h256("eth_sendRawTransaction", "result", &result)?),
            Err(err) => match err.node_message() {
                Some(message) => Err(EthClientError::SendRawTransaction(message.to_owned())),
                None => Err(err.into()),
            },
        }
    }

    pub async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, EthClientError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([format!("{tx_hash:#x}")]))
            .await?;
        Ok(parse_receipt(&result)?)
    }

    /// Polls for the receipt until it appears or `max_wait` elapses.
    pub async fn wait_for_transaction_receipt(
        &self,
        tx_hash: H256,
        max_wait: Duration,
    ) -> Result<Receipt, EthClientError> {
        let started = tokio::time::Instant::now();
        loop {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if started.elapsed() >= max_wait {
                return Err(EthClientError::ReceiptTimeout {
                    tx_hash,
                    waited_secs: max_wait.as_secs(),
                });
            }
            trace!(tx_hash = %format!("{tx_hash:#x}"), "Receipt not available yet");
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }

    pub async fn call(&self, request: &CallRequest, block: BlockTag) -> Result<Vec<u8>, EthClientError> {
        match self
            .rpc_call("eth_call", json!([request.to_json(), block.to_param()]))
            .await
        {
            Ok(result) => Ok(parse_bytes("eth_call", "result", &result)?),
            Err(err) => match (err.node_message(), request.to) {
                (Some(message), Some(to)) => Err(EthClientError::CallReverted {
                    to,
                    message: message.to_owned(),
                }),
                _ => Err(err.into()),
            },
        }
    }

    pub async fn get_code(&self, address: Address, block: BlockTag) -> Result<Vec<u8>, EthClientError> {
        let result = self
            .rpc_call("eth_getCode", json!([format!("{address:#x}"), block.to_param()]))
            .await?;
        Ok(parse_bytes("eth_getCode", "result", &result)?)
    }

    pub async fn get_block_timestamp(&self, block: BlockTag) -> Result<u64, EthClientError> {
        let result = self
            .rpc_call("eth_getBlockByNumber", json!([block.to_param(), false]))
            .await?;
        Ok(parse_block_timestamp(&result)?)
    }

    fn backoff(&self, attempt: u32, last_error: Option<&RpcError>) -> Duration {
        last_error
            .and_then(RpcError::retry_after_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.base_backoff * 2u32.saturating_pow(attempt - 1))
    }

    /// Executes a JSON-RPC call with retry and backoff.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let max_attempts = self.config.max_retries + 1;
        let mut last_error: Option<RpcError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt, last_error.as_ref());
                warn!(
                    method,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "Retrying RPC call"
                );
                tokio::time::sleep(delay).await;
            }

            match self.rpc_call_once(method, &body).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt + 1 >= max_attempts => {
                    if attempt == 0 {
                        return Err(err);
                    }
                    return Err(RpcError::RetryExhausted {
                        method: method.into(),
                        attempts: attempt + 1,
                        last_error: Box::new(err),
                    });
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(RpcError::RetryExhausted {
            method: method.into(),
            attempts: max_attempts,
            last_error: Box::new(last_error.unwrap_or_else(|| {
                RpcError::parse(method, "result", "no attempt was made")
            })),
        })
    }

    /// Single attempt at an RPC call (no retry).
    async fn rpc_call_once(&self, method: &str, body: &Value) -> Result<Value, RpcError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RpcError::Timeout {
                        method: method.into(),
                        elapsed_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    RpcError::ConnectionFailed {
                        url: self.url.to_string(),
                        cause: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::HttpError {
                method: method.into(),
                status: status.as_u16(),
                body,
                retry_after_secs,
            });
        }

        let json_response: Value = response
            .json()
            .await
            .map_err(|err| RpcError::parse(method, "response_body", err))?;
        extract_result(method, json_response)
    }
}

fn extract_result(method: &str, mut response: Value) -> Result<Value, RpcError> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let mut message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        // Revert payloads ride in `data`; keep them for the operator.
        if let Some(data) = error.get("data").and_then(Value::as_str) {
            if hex_decode(method, "error.data", data).is_ok_and(|bytes| !bytes.is_empty()) {
                message = format!("{message} (data: {data})");
            }
        }
        return Err(RpcError::JsonRpcError {
            method: method.into(),
            code,
            message,
        });
    }
    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| RpcError::parse(method, "result", "missing result field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_result_and_node_errors() {
        let result = extract_result("eth_chainId", json!({ "jsonrpc": "2.0", "id": 1, "result": "0xaa36a7" }))
            .expect("result present");
        assert_eq!(parse_u64("eth_chainId", "result", &result).ok(), Some(11155111));

        let err = extract_result(
            "eth_estimateGas",
            json!({ "error": { "code": 3, "message": "execution reverted", "data": "0x08c379a0" } }),
        )
        .expect_err("node error");
        assert_eq!(err.node_message(), Some("execution reverted (data: 0x08c379a0)"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limit_uses_retry_after() {
        let client = EthClient::new("http://127.0.0.1:8545").expect("valid url");
        let limited = RpcError::HttpError {
            method: "eth_call".into(),
            status: 429,
            body: String::new(),
            retry_after_secs: Some(7),
        };
        assert!(limited.is_retryable());
        assert_eq!(client.backoff(1, Some(&limited)), Duration::from_secs(7));
        assert_eq!(client.backoff(3, None), Duration::from_secs(4));
    }

    #[test]
    fn creation_request_has_no_to_field() {
        let request = CallRequest {
            from: Some(Address::repeat_byte(0x01)),
            to: None,
            data: vec![0x60, 0x80],
            value: U256::zero(),
        };
        assert_eq!(
            request.to_json(),
            json!({ "from": format!("{:#x}", Address::repeat_byte(0x01)), "data": "0x6080" })
        );
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(EthClient::new("not a url"), Err(EthClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn unreachable_node_exhausts_retries() {
        let client = EthClient::new_with_config(
            "http://127.0.0.1:9",
            RpcConfig {
                max_retries: 1,
                base_backoff: Duration::from_millis(1),
                ..RpcConfig::default()
            },
        )
        .expect("valid url");
        match client.chain_id().await {
            Err(EthClientError::Rpc(RpcError::RetryExhausted { attempts, .. })) => {
                assert_eq!(attempts, 2)
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }
}
