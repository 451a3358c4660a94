//! Error taxonomy for the probe engine.
//!
//! `BrowserNotFound` is the one variant the orchestrator treats as fatal
//! run-wide; everything else is recorded on a per-target `ProbeResult`
//! and the run continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("browser executable not found or failed to start")]
    BrowserNotFound,

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("screenshot capture failed: {0}")]
    Screenshot(String),

    #[error("image encode/decode failed: {0}")]
    Encode(String),

    #[error("devtools protocol error: {0}")]
    Cdp(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// True for errors the orchestrator treats as fatal for the whole run,
    /// not just the one target that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::BrowserNotFound)
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Config(err.to_string())
    }
}
