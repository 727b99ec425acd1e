/// Transport-level failure of a single JSON-RPC method.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Connection to {url} failed: {cause}")]
    ConnectionFailed { url: String, cause: String },

    #[error("{method} timed out after {elapsed_ms}ms")]
    Timeout { method: String, elapsed_ms: u64 },

    #[error("{method} HTTP {status}: {body}")]
    HttpError {
        method: String,
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{method} JSON-RPC error {code}: {message}")]
    JsonRpcError {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} response parse error in {field}: {cause}")]
    ParseError {
        method: String,
        field: String,
        cause: String,
    },

    #[error("{method} failed after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        method: String,
        attempts: u32,
        last_error: Box<RpcError>,
    },
}

impl RpcError {
    /// Whether this error is likely transient and retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::ConnectionFailed { .. } | RpcError::Timeout { .. } => true,
            // 429 = rate limited, 502/503/504 = upstream trouble
            RpcError::HttpError { status, .. } => matches!(*status, 429 | 502 | 503 | 504),
            RpcError::JsonRpcError { .. }
            | RpcError::ParseError { .. }
            | RpcError::RetryExhausted { .. } => false,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RpcError::HttpError {
                status: 429,
                retry_after_secs,
                ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub(crate) fn parse(method: &str, field: &str, cause: impl ToString) -> Self {
        RpcError::ParseError {
            method: method.to_owned(),
            field: field.to_owned(),
            cause: cause.to_string(),
        }
    }

    /// Message of the node-side error, looking through retry wrapping.
    pub fn node_message(&self) -> Option<&str> {
        match self {
            RpcError::JsonRpcError { message, .. } => Some(message),
            RpcError::RetryExhausted { last_error, .. } => last_error.node_message(),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EthClientError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("eth_estimateGas failed: {0}")]
    EstimateGas(String),
    #[error("eth_sendRawTransaction failed: {0}")]
    SendRawTransaction(String),
    #[error("transaction {tx_hash:#x} was not mined within {waited_secs}s")]
    ReceiptTimeout {
        tx_hash: ethereum_types::H256,
        waited_secs: u64,
    },
    #[error("eth_call to {to:#x} reverted: {message}")]
    CallReverted {
        to: ethereum_types::Address,
        message: String,
    },
    #[error("invalid RPC URL `{0}`")]
    InvalidUrl(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("private key must be 32 bytes of hex (with or without 0x)")]
    MalformedKey,
    #[error("private key is not a valid secp256k1 scalar")]
    InvalidKey,
}

#[derive(Debug, thiserror::Error)]
pub enum EtherscanError {
    #[error("Etherscan request failed: {0}")]
    Http(String),
    #[error("Etherscan returned an unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Etherscan rejected the submission: {0}")]
    Rejected(String),
    #[error("verification still pending after {polls} status checks (guid {guid})")]
    StillPending { guid: String, polls: u32 },
    #[error("Etherscan verification failed: {0}")]
    Failed(String),
}
