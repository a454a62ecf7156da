//! Configuration loading for the codexgate proxy.
//!
//! Uses figment to layer a YAML file and `CODEXGATE_*` environment variables
//! over built-in defaults.

pub mod schema;

pub use schema::{
    Config, ENV_PREFIX, LimitsConfig, LogConfig, LogFormat, RelayConfig, UpstreamConfig,
};
