//! Best-effort decoding of ChatGPT access tokens.
//!
//! The signature is never verified: the backend does that. We only read the
//! `exp` claim and the account id embedded under the `OpenAI` auth claim.

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use codexgate_types::{GateError, Result};
use serde_json::Value;

/// Namespaced claim carrying ChatGPT account metadata.
pub const AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// Field inside [`AUTH_CLAIM`] holding the account id.
pub const ACCOUNT_ID_FIELD: &str = "chatgpt_account_id";

/// Decode the payload segment of a three-part dot-delimited token.
///
/// Returns `None` on any malformation; it is best-effort, not a validator.
#[must_use]
pub fn decode_token(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let json: Value = serde_json::from_slice(&bytes).ok()?;
    json.is_object().then_some(json)
}

/// Extract the ChatGPT account id from an access token.
///
/// # Errors
///
/// Returns [`GateError::Auth`] if the token cannot be decoded or lacks the claim.
pub fn derive_account_id(access_token: &str) -> Result<String> {
    decode_token(access_token)
        .as_ref()
        .and_then(|payload| payload.get(AUTH_CLAIM))
        .and_then(|claim| claim.get(ACCOUNT_ID_FIELD))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| GateError::Auth("access token carries no ChatGPT account id".into()))
}

/// `exp` claim of a decoded payload, converted to milliseconds.
#[must_use]
pub fn expiry_ms(payload: &Value) -> Option<u64> {
    payload
        .get("exp")
        .and_then(Value::as_u64)
        .map(|secs| secs.saturating_mul(1000))
}
