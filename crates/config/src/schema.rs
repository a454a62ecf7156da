use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CODEXGATE_";

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_backend_url() -> String {
    "https://chatgpt.com/backend-api/codex/responses".to_string()
}
fn default_token_url() -> String {
    "https://auth.openai.com/oauth/token".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Outbound endpoints and transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Responses endpoint every proxied request is sent to.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// OAuth token endpoint used for refresh-token exchange.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Connect timeout for outbound calls. There is no total timeout:
    /// streamed responses may legitimately run for minutes.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            token_url: default_token_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Relay service that hands out fresh access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <api_key>` when present.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Inbound request limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted request body, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `codexgate_proxy=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port; `0` binds an ephemeral port.
    #[serde(default)]
    pub port: u16,
    /// Where to publish `{port, processId}` once listening.
    #[serde(default)]
    pub server_info_file: Option<PathBuf>,
    /// Optional outbound proxy for all upstream calls.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Presence selects relay refresh for the whole process lifetime.
    #[serde(default)]
    pub relay: Option<RelayConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            server_info_file: None,
            proxy_url: None,
            upstream: UpstreamConfig::default(),
            relay: None,
            limits: LimitsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults.
    ///
    /// Files ending in `.json` are read as JSON, everything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        with_file(Figment::from(Serialized::defaults(Config::default())), path).extract()
    }

    /// Loads defaults, then the optional file, then `CODEXGATE_*` environment
    /// variables (`__` separates nested keys, e.g. `CODEXGATE_UPSTREAM__TOKEN_URL`).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if any layer fails to parse.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = with_file(figment, path);
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// `host:port` string suitable for binding.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn with_file(figment: Figment, path: &Path) -> Figment {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        figment.merge(Json::file(path))
    } else {
        figment.merge(Yaml::file(path))
    }
}
