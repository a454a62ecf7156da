//! OAuth token state and expiry logic.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A token is considered stale this many milliseconds before it actually expires.
pub const REFRESH_MARGIN_MS: u64 = 60_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// How a [`TokenState`] obtains a fresh access token.
///
/// Chosen once at construction and never switched afterwards.
#[derive(Clone, PartialEq, Eq)]
pub enum RefreshSource {
    /// Exchange a refresh token at the OAuth token endpoint.
    AuthServer { refresh_token: String },
    /// Fetch a ready-made access token from a relay service.
    Relay {
        url: String,
        api_key: Option<String>,
    },
}

impl fmt::Debug for RefreshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthServer { .. } => f.write_str("AuthServer"),
            Self::Relay { url, .. } => f.debug_struct("Relay").field("url", url).finish(),
        }
    }
}

/// The single source of truth for authentication.
///
/// `expires_at` and `account_id` are always derived from `access_token`;
/// use [`TokenState::replace_access_token`] instead of assigning fields one by one.
#[derive(Clone)]
pub struct TokenState {
    pub access_token: String,
    /// Absolute expiry, milliseconds since the Unix epoch.
    pub expires_at: u64,
    pub account_id: String,
    pub source: RefreshSource,
}

impl TokenState {
    /// Return `true` if the token expires within [`REFRESH_MARGIN_MS`] or already has.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(now_ms())
    }

    /// Same as [`TokenState::needs_refresh`] against an explicit clock reading.
    #[must_use]
    pub fn needs_refresh_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_add(REFRESH_MARGIN_MS) >= self.expires_at
    }

    /// Whether refreshes go through a relay service.
    #[must_use]
    pub fn is_relay(&self) -> bool {
        matches!(self.source, RefreshSource::Relay { .. })
    }

    /// Swap in a new access token together with its expiry and account id.
    pub fn replace_access_token(
        &mut self,
        access_token: String,
        expires_at: u64,
        account_id: String,
    ) {
        self.access_token = access_token;
        self.expires_at = expires_at;
        self.account_id = account_id;
    }

    /// Snapshot of the values a backend call needs.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_token: self.access_token.clone(),
            account_id: self.account_id.clone(),
        }
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .field("source", &self.source)
            .finish()
    }
}

/// Access token and account id captured for a single backend call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub account_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .finish()
    }
}
