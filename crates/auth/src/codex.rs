//! `OpenAI` Codex CLI OAuth refresh-token exchange.
//!
//! Only the refresh half of the Codex CLI flow lives here; acquiring the first
//! token pair happens outside this process.

use codexgate_types::now_ms;
use serde_json::Value;

/// OAuth 2.0 client ID for Codex CLI.
pub const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

/// `OpenAI` OAuth token endpoint.
pub const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";

/// Result of a refresh-token exchange.
///
/// A failed refresh is an expected condition, so it is a variant rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed {
        access_token: String,
        refresh_token: String,
        /// Absolute expiry, milliseconds since the Unix epoch.
        expires_at: u64,
    },
    Failed {
        reason: String,
    },
}

impl RefreshOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Build the form-urlencoded parameters for the refresh request.
#[must_use]
pub fn refresh_form_params(refresh_token: &str) -> [(&'static str, &str); 3] {
    [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", CLIENT_ID),
    ]
}

/// Interpret the token endpoint JSON, anchoring `expires_in` at `now_ms`.
///
/// All three fields are required; anything missing yields [`RefreshOutcome::Failed`].
#[must_use]
pub fn parse_refresh_response(json: &Value, now_ms: u64) -> RefreshOutcome {
    let access_token = json.get("access_token").and_then(Value::as_str);
    let refresh_token = json.get("refresh_token").and_then(Value::as_str);
    let expires_in = json.get("expires_in").and_then(Value::as_u64);

    match (access_token, refresh_token, expires_in) {
        (Some(access), Some(refresh), Some(secs)) => RefreshOutcome::Refreshed {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at: now_ms.saturating_add(secs.saturating_mul(1000)),
        },
        _ => RefreshOutcome::failed("token response missing access_token, refresh_token or expires_in"),
    }
}

/// Exchange `refresh_token` at `token_url`. Never returns an error: transport,
/// status and parse failures all collapse into [`RefreshOutcome::Failed`].
pub async fn refresh_via_auth_server(
    http: &rquest::Client,
    token_url: &str,
    refresh_token: &str,
) -> RefreshOutcome {
    let params = refresh_form_params(refresh_token);
    let resp = match http
        .post(token_url)
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => return RefreshOutcome::failed(format!("token request failed: {e}")),
    };

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return RefreshOutcome::failed(format!("token endpoint returned {status}: {text}"));
    }

    match resp.json::<Value>().await {
        Ok(json) => parse_refresh_response(&json, now_ms()),
        Err(e) => RefreshOutcome::failed(format!("failed to parse token response: {e}")),
    }
}
