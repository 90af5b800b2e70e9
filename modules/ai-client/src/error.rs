use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429 — the per-minute quota is exhausted. `retry_after` is the
    /// server's hint in seconds, when it sent one.
    #[error("Rate limited (429): {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty response from model")]
    EmptyResponse,
}

impl AiError {
    /// True for quota/rate-limit failures, which callers back off for much
    /// longer than ordinary API errors.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AiError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Network(err.to_string())
    }
}
