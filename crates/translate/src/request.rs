//! Rewrites client Responses API requests into the shape the Codex backend accepts.
//!
//! The backend is stateless (`store: false`), always streams, rejects item ids
//! that reference server-side state, and does not understand the legacy token
//! limit fields. Everything the proxy does not recognize is carried through in
//! an overflow map.

use codexgate_types::{GateError, Result};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::models::normalize_model;

/// Input item type dropped before forwarding.
pub const ITEM_REFERENCE: &str = "item_reference";

/// `include` entry asking the backend to echo encrypted reasoning inline.
pub const ENCRYPTED_REASONING: &str = "reasoning.encrypted_content";

pub const DEFAULT_EFFORT: &str = "medium";
pub const DEFAULT_SUMMARY: &str = "auto";

/// Client request body.
///
/// Recognized fields are typed; a field whose value has the wrong shape is
/// treated as absent rather than rejecting the request. Everything else,
/// `instructions` included, lives in `extra` and is forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Input>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<Value>>,
    /// Accepted from clients, never forwarded.
    #[serde(default, skip_serializing)]
    pub max_output_tokens: Option<Value>,
    /// Accepted from clients, never forwarded.
    #[serde(default, skip_serializing)]
    pub max_completion_tokens: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `input` field: normally a list of items, but a bare string prompt (or
/// anything else) is forwarded as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Items(Vec<InputEntry>),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputEntry {
    Item(InputItem),
    Raw(Value),
}

/// One object input item. The `id` is read but never written back.
///
/// `type` is kept as whatever JSON value the client sent, `null` included, so
/// every object entry lands here and loses its `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<Value>,
    #[serde(default, skip_serializing)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reasoning settings. `effort` and `summary` are forwarded as sent; only an
/// absent or `null` value is replaced by the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A request ready for the backend plus the streaming mode the client asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRequest {
    pub body: ResponsesRequest,
    /// `true` only if the client sent `"stream": true`. The body itself always streams.
    pub was_streaming: bool,
}

/// Deserialize `T`, mapping a value of the wrong shape to `None`.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A present key becomes `Some`, even when its value is `null`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Parse an inbound body. Only a JSON object is accepted.
///
/// # Errors
///
/// Returns [`GateError::InvalidRequest`] for malformed JSON or a non-object body.
pub fn parse_request(bytes: &[u8]) -> Result<ResponsesRequest> {
    let invalid = || GateError::InvalidRequest("Invalid JSON body".into());
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ Value::Object(_)) => serde_json::from_value(value).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Rewrite a client request for the backend. Never fails.
#[must_use]
pub fn transform(mut body: ResponsesRequest) -> TransformedRequest {
    let was_streaming = body.stream == Some(true);

    body.model = Some(normalize_model(body.model.as_deref()));
    body.store = Some(false);
    body.stream = Some(true);

    if let Some(Input::Items(items)) = body.input.as_mut() {
        items.retain(|entry| !is_item_reference(entry));
        for entry in items.iter_mut() {
            if let InputEntry::Item(item) = entry {
                item.id = None;
            }
        }
    }

    let reasoning = body.reasoning.get_or_insert_with(Reasoning::default);
    reasoning
        .effort
        .get_or_insert_with(|| Value::String(DEFAULT_EFFORT.to_string()));
    reasoning
        .summary
        .get_or_insert_with(|| Value::String(DEFAULT_SUMMARY.to_string()));

    let include = body.include.get_or_insert_with(Vec::new);
    if !include
        .iter()
        .any(|v| v.as_str() == Some(ENCRYPTED_REASONING))
    {
        include.push(Value::String(ENCRYPTED_REASONING.to_string()));
    }

    body.max_output_tokens = None;
    body.max_completion_tokens = None;

    TransformedRequest {
        body,
        was_streaming,
    }
}

fn is_item_reference(entry: &InputEntry) -> bool {
    match entry {
        InputEntry::Item(item) => {
            item.kind.as_ref().and_then(Value::as_str) == Some(ITEM_REFERENCE)
        }
        InputEntry::Raw(value) => {
            value.get("type").and_then(Value::as_str) == Some(ITEM_REFERENCE)
        }
    }
}

/// The complete header set for a backend call. Nothing from the client request
/// is copied over.
#[must_use]
pub fn build_headers(access_token: &str, account_id: &str) -> [(&'static str, String); 6] {
    [
        ("authorization", format!("Bearer {access_token}")),
        ("content-type", "application/json".to_string()),
        ("chatgpt-account-id", account_id.to_string()),
        ("openai-beta", "responses=experimental".to_string()),
        ("originator", "codex_cli_rs".to_string()),
        ("accept", "text/event-stream".to_string()),
    ]
}
