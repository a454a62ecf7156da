//! OAuth token lifecycle for the Codex backend.
//!
//! Seed tokens are supplied from outside; this crate decodes them, refreshes
//! them through the auth server or a relay service, and coordinates refreshes
//! behind the [`TokenManager`].

pub mod codex;
pub mod jwt;
pub mod manager;
pub mod relay;
pub mod state;

pub use codex::RefreshOutcome;
pub use manager::TokenManager;
pub use state::{initialize, select_source};
