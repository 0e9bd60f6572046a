use thiserror::Error;

/// Failure of a single URL lookup. Never fatal to the process and never cached.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("status code {0} is not 200")]
    BadStatus(u16),

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("unparseable response: {0}")]
    ParseFailure(String),

    #[error("media upload failed: {0}")]
    Upload(String),
}

impl FetchError {
    /// Short stable name used as a structured logging field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::BadStatus(_) => "bad_status",
            Self::TooLarge { .. } => "too_large",
            Self::ParseFailure(_) => "parse_failure",
            Self::Upload(_) => "upload",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::BadStatus(status.as_u16())
        } else if err.is_decode() {
            Self::ParseFailure(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkPreviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, LinkPreviewError>;
