//! Core types and traits for the codexgate workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! proxy: the error enum, the in-memory token state, and the async trait the
//! HTTP layer uses to obtain credentials.

pub mod error;
pub mod token;
pub mod traits;

pub use error::{GateError, Result};
pub use token::{Credentials, REFRESH_MARGIN_MS, RefreshSource, TokenState, now_ms};
pub use traits::{ByteStream, CredentialSource};
