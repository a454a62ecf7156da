//! Relay refresh: a third-party service hands out ready-made access tokens.

use codexgate_types::{GateError, RefreshSource, Result, TokenState};
use serde::Deserialize;

use crate::jwt;

/// Payload returned by the relay endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayToken {
    pub access_token: String,
    /// Absolute expiry in milliseconds (not a TTL).
    pub expires_at: u64,
}

/// `GET url` with an optional bearer key and decode the token payload.
///
/// # Errors
///
/// Returns [`GateError::Relay`] on transport failure, non-2xx status, or a
/// payload missing `access_token` / `expires_at`.
pub async fn fetch_relay_token(
    http: &rquest::Client,
    url: &str,
    api_key: Option<&str>,
) -> Result<RelayToken> {
    let mut req = http.get(url).header("Accept", "application/json");
    if let Some(key) = api_key {
        req = req.header("Authorization", format!("Bearer {key}"));
    }

    let resp = req
        .send()
        .await
        .map_err(|e| GateError::Relay(format!("relay request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(GateError::Relay(format!("relay returned {status}: {text}")));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| GateError::Relay(format!("failed to read relay response: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GateError::Relay(format!("malformed relay response: {e}")))
}

/// Replace the state's access token with one fetched from its relay.
///
/// # Errors
///
/// Returns [`GateError::Relay`] if the state is not in relay mode or the fetch
/// fails, and [`GateError::Auth`] if the new token carries no account id.
pub async fn refresh_via_relay(http: &rquest::Client, state: &mut TokenState) -> Result<()> {
    let RefreshSource::Relay { url, api_key } = &state.source else {
        return Err(GateError::Relay("token state is not in relay mode".into()));
    };

    let token = fetch_relay_token(http, url, api_key.as_deref()).await?;
    let account_id = jwt::derive_account_id(&token.access_token)?;
    state.replace_access_token(token.access_token, token.expires_at, account_id);
    Ok(())
}
