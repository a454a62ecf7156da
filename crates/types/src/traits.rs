//! Async traits shared across all codexgate crates.
//!
//! Cross-crate abstractions live here so that the proxy layer depends only on
//! `codexgate-types`, not on the concrete token manager.

use crate::Credentials;
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

pub use crate::error::Result;

/// A pinned, sendable stream of upstream body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Hands out credentials that are valid for at least the refresh margin.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return usable credentials, refreshing first if the current token is stale.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GateError::Auth`] or [`crate::GateError::Relay`] when a
    /// refresh was needed and failed.
    async fn credentials(&self) -> Result<Credentials>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl CredentialSource for Fixed {
        async fn credentials(&self) -> Result<Credentials> {
            Ok(Credentials {
                access_token: "tok".into(),
                account_id: "acct".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let source: std::sync::Arc<dyn CredentialSource> = std::sync::Arc::new(Fixed);
        let creds = source.credentials().await.unwrap();
        assert_eq!(creds.account_id, "acct");
    }
}
