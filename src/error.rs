use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a browser session while loading or driving a page
#[derive(Debug, Error)]
pub enum FetchError {
    /// None of the readiness selectors appeared before the deadline
    #[error("timed out after {timeout:?} waiting for [{selectors}] on {url}")]
    Timeout {
        url: String,
        selectors: String,
        timeout: Duration,
    },

    /// The browser refused or failed the navigation itself
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The WebDriver session is gone and must be re-established
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// Any other WebDriver command failure
    #[error("webdriver command failed: {0}")]
    Command(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, FetchError::SessionLost(_))
    }
}

/// Run-level failures. Everything below this level is absorbed into the batch.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// No WebDriver session could be started
    #[error("browser runtime unavailable at {endpoint}: {reason}")]
    RuntimeUnavailable { endpoint: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}
