// Error taxonomy surfaced to the user

use thiserror::Error;

/// Failure talking to the aggregation backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Non-2xx response. `message` is the backend's `detail` when it sent one,
    /// otherwise a generic status-coded text.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// Connection refused, timeout, TLS failure...
    #[error("Network error: {0}")]
    Network(String),

    /// 2xx response whose body could not be understood
    #[error("Unexpected response from server: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        let message = match detail {
            Some(detail) if !detail.trim().is_empty() => detail,
            _ => format!("Request failed with status {}", status),
        };
        GatewayError::Status { status, message }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Why a submission did not produce results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("Please enter a prompt")]
    EmptyPrompt,

    #[error("A request is already in progress")]
    AlreadyInProgress,

    #[error("Rate limit reached. Please wait {wait_seconds} seconds (until {retry_at}).")]
    RateLimited { wait_seconds: u64, retry_at: String },

    #[error(transparent)]
    Transport(#[from] GatewayError),

    #[error("Failed to display results: {0}")]
    Display(String),
}

impl SubmitError {
    /// Rejections happen before anything is sent to the backend.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SubmitError::EmptyPrompt | SubmitError::AlreadyInProgress | SubmitError::RateLimited { .. }
        )
    }
}
