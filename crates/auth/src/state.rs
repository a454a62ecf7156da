//! Construction of the process-wide [`TokenState`] from seed tokens.

use codexgate_types::{RefreshSource, Result, TokenState};

use crate::jwt;

/// Pick the refresh strategy for the lifetime of the state.
///
/// A relay URL always wins; a refresh token supplied alongside it is ignored.
#[must_use]
pub fn select_source(
    refresh_token: Option<String>,
    relay_url: Option<String>,
    relay_key: Option<String>,
) -> RefreshSource {
    match relay_url.filter(|u| !u.is_empty()) {
        Some(url) => {
            if refresh_token.as_deref().is_some_and(|t| !t.is_empty()) {
                tracing::warn!("relay URL configured; the supplied refresh token will not be used");
            }
            RefreshSource::Relay {
                url,
                api_key: relay_key.filter(|k| !k.is_empty()),
            }
        }
        None => RefreshSource::AuthServer {
            refresh_token: refresh_token.unwrap_or_default(),
        },
    }
}

/// Build the initial state from a seed access token.
///
/// Expiry comes from the token's `exp` claim; without one the state starts
/// already expired so the first use triggers a refresh.
///
/// # Errors
///
/// Returns [`codexgate_types::GateError::Auth`] if the access token carries no account id.
pub fn initialize(access_token: &str, source: RefreshSource) -> Result<TokenState> {
    let expires_at = jwt::decode_token(access_token)
        .as_ref()
        .and_then(jwt::expiry_ms)
        .unwrap_or(0);
    let account_id = jwt::derive_account_id(access_token)?;

    Ok(TokenState {
        access_token: access_token.to_string(),
        expires_at,
        account_id,
        source,
    })
}
