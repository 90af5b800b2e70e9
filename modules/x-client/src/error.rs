use thiserror::Error;

pub type Result<T> = std::result::Result<T, XApiError>;

#[derive(Debug, Error)]
pub enum XApiError {
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429. `reset_epoch` is the `x-rate-limit-reset` header (unix
    /// seconds) when present.
    #[error("Rate limited (429)")]
    RateLimited { reset_epoch: Option<u64> },

    #[error("Invalid or expired bearer token")]
    Unauthorized,

    #[error("X API credits exhausted")]
    CreditsExhausted,

    #[error("Account is protected or suspended")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for XApiError {
    fn from(err: reqwest::Error) -> Self {
        XApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for XApiError {
    fn from(err: serde_json::Error) -> Self {
        XApiError::Parse(err.to_string())
    }
}
