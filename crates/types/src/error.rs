//! Unified error type for the codexgate workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across codexgate crates.
#[derive(Debug, Error)]
pub enum GateError {
    /// Token refresh failed or the account id could not be derived.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The relay service refused the request or returned a malformed payload.
    #[error("relay error: {0}")]
    Relay(String),

    /// The client sent a request the proxy cannot accept.
    #[error("{0}")]
    InvalidRequest(String),

    /// Route or method not served by the proxy.
    #[error("not found")]
    NotFound,

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O failure (socket bind, server-info file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for GateError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl GateError {
    /// Returns `true` if the error means the credentials are unusable.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Relay(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GateError>;
