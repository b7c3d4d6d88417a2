// Error types for gtrend.
// Covers upstream feed errors, persistent store errors, and configuration errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GtrendError {
    #[error("Trending API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Trending API returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl GtrendError {
    /// Whether retrying the same upstream request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GtrendError::Api(e) => e.is_timeout() || e.is_connect(),
            GtrendError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GtrendError>;
