//! Abstracts the browser back-end behind a one-shot-per-target `witness`
//! call plus `close`, so the orchestrator doesn't need to know which
//! automation stack is driving the browser.

use crate::error::ProbeError;
use crate::result::ProbeResult;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Driver: Send + Sync {
    /// Produce a complete observation of `target`. Must be safe to call
    /// from multiple workers concurrently and must not leak browser
    /// processes or temporary directories on any exit path.
    async fn witness(&self, target: String) -> Result<ProbeResult, ProbeError>;

    /// Release long-lived resources. Called once at shutdown.
    async fn close(&self);
}
