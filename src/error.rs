use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Browser not found. Please install Chrome, Brave, Edge, or Chromium.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser session not running. Use 'tabdriver browser start' first.")]
    SessionNotRunning,

    #[error("Control endpoint request failed: {0}")]
    ControlEndpoint(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("No automation handle could be bound for target {0}")]
    ResolutionFailed(String),

    #[error("Action '{kind}' on target {target} requires a reference")]
    MissingReference { kind: String, target: String },

    #[error("Unsupported action kind '{kind}' for target {target}")]
    UnsupportedAction { kind: String, target: String },

    #[error("Evaluation failed on target {target}: {message}")]
    Eval { target: String, message: String },

    #[error("Action '{kind}' failed on target {target}: {message}")]
    Action {
        kind: String,
        target: String,
        message: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No download completed within {0:?}")]
    DownloadTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Attach action kind and target context to a low-level failure.
    pub fn for_action(kind: &str, target: &str, err: impl std::fmt::Display) -> Self {
        DriverError::Action {
            kind: kind.to_string(),
            target: target.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
