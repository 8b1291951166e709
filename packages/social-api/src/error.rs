use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocialApiError>;

#[derive(Debug, Error)]
pub enum SocialApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limit still exhausted for {endpoint} after retrying")]
    RateLimited { endpoint: &'static str },

    #[error("Batch of {len} IDs exceeds the lookup limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl SocialApiError {
    /// Failures worth another attempt: transport errors and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            SocialApiError::Network(_) => true,
            SocialApiError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SocialApiError {
    fn from(err: reqwest::Error) -> Self {
        SocialApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SocialApiError {
    fn from(err: serde_json::Error) -> Self {
        SocialApiError::Parse(err.to_string())
    }
}
