//! Sync orchestration: the recurring schedule, the backend seam it drives,
//! and the result events it streams.

mod orchestrator;
mod types;

pub use orchestrator::SyncOrchestrator;
pub use types::{step, Credentials, SyncResult};

use async_trait::async_trait;

use crate::error::Result;

/// What the orchestrator needs from the remote side.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Authenticate and persist the new token.
    async fn login(&self, username: &str, password: &str) -> Result<String>;

    /// Run one full sync cycle, returning one result per executed step.
    async fn run_sync_sequence(&self) -> Vec<SyncResult>;
}
