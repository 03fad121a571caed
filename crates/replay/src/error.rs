//! Error types for interaction-log replay

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Interaction log not found: {}", .0.display())]
    LogNotFound(PathBuf),

    #[error("Invalid JSON at {}:{line}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON line must be an object at {}:{line}", path.display())]
    NotAnObject { path: PathBuf, line: usize },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error(
        "Replay failed on line={line}, seq={}, event={event}/{action}, testId={}",
        seq.as_deref().unwrap_or("None"),
        test_id.as_deref().unwrap_or("None")
    )]
    StepFailed {
        line: usize,
        seq: Option<String>,
        event: String,
        action: String,
        test_id: Option<String>,
        #[source]
        source: Box<ReplayError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown replay profile: {0}")]
    UnknownProfile(String),

    #[error("Playwright not found. Install with: npm install playwright")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Remote debugger not reachable: {0}")]
    Debugger(String),

    #[error("Visual mismatch: {0}")]
    VisualMismatch(String),

    #[error("Screenshot comparison failed: {0}")]
    VisualCompare(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type ReplayResult<T> = Result<T, ReplayError>;

impl ReplayError {
    /// Shorthand for failures raised inside step handlers.
    pub fn handler(message: impl Into<String>) -> Self {
        ReplayError::Handler(message.into())
    }
}
