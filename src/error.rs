//! Error taxonomy shared by the store, the ZKBio client and the orchestrator.

use thiserror::Error;

/// Failure of a sync-agent operation.
///
/// Every variant carries the message a user sees in the log stream, so
/// surfaces can forward `to_string()` unchanged.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The vendor server could not be reached (refused, DNS, timeout).
    #[error("{0}")]
    Connection(String),

    /// Credentials rejected, or the server answered without a token.
    #[error("{0}")]
    Auth(String),

    /// The auth endpoint returned 404; the server URL is probably wrong.
    #[error("{0}")]
    NotFound(String),

    /// Any other failed remote call.
    #[error("{0}")]
    Remote(String),

    /// A required setting is missing.
    #[error("{0}")]
    Config(String),

    /// Stop requested while nothing was running.
    #[error("{0}")]
    NoOp(String),

    /// The persisted document could not be read or written.
    #[error("Store error: {0}")]
    Store(String),
}

impl SyncError {
    /// Short machine-readable kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Remote(_) => "remote",
            Self::Config(_) => "config",
            Self::NoOp(_) => "no_op",
            Self::Store(_) => "store",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
