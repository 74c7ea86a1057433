use thiserror::Error;

/// Errors from hub RPC calls. Grounded on `api/errors.rs`'s `ApiError`
/// taxonomy, trimmed to the subset the hub surface actually needs.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse hub response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("hub returned an error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("hub authentication failed")]
    Authentication,

    #[error("hub resource not found: {0}")]
    NotFound(String),

    #[error("hub request timed out")]
    Timeout,

    #[error("all retry attempts exhausted: {0}")]
    RetryExhausted(String),

    #[error("invalid hub URL: {0}")]
    InvalidUrl(String),
}

impl HubError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HubError::Request(e) => e.is_connect() || e.is_timeout(),
            HubError::Server { status, .. } => *status >= 500,
            HubError::Timeout => true,
            _ => false,
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
