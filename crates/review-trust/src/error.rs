//! Error types for configuration, storage, and the fetch layer.

use std::time::Duration;

/// Errors raised outside the fetch path (configuration, session storage, sinks).
#[derive(thiserror::Error, Debug)]
pub enum TrustError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Sink error: {0}")]
    Sink(String),
}

/// Convenience result type.
pub type TrustResult<T> = Result<T, TrustError>;

/// Failures of a single fetch attempt.
///
/// Being blocked is not an error: a blocked page comes back as a
/// [`FetchOutcome`](crate::fetch::FetchOutcome) with `blocked = true`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("fetcher unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    /// Timeouts are retried once by the orchestrator; everything else is final for the stage.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }

    /// Short machine-readable cause used in job messages.
    pub fn cause(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::Network(_) => "network",
            FetchError::LoginFailed(_) => "login",
            FetchError::Browser(_) => "browser",
            FetchError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(Duration::ZERO)
        } else {
            FetchError::Network(e.to_string())
        }
    }
}
