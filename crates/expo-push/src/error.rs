use reqwest::StatusCode;

/// Result alias for gateway calls.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("push service answered HTTP {status} during {operation}: {body}")]
    HttpStatus {
        status: StatusCode,
        operation: &'static str,
        body: String,
    },

    #[error("push service rejected the request: {code}: {message}")]
    Request { code: String, message: String },

    #[error("failed to decode push service response: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },

    #[error("expected {expected} push tickets but received {actual}")]
    TicketCountMismatch { expected: usize, actual: usize },

    #[error("invalid client configuration: {reason}")]
    Configuration { reason: String },
}

impl Error {
    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { source } => source.is_timeout() || source.is_connect(),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Request { .. }
            | Self::Decode { .. }
            | Self::TicketCountMismatch { .. }
            | Self::Configuration { .. } => false,
        }
    }
}
