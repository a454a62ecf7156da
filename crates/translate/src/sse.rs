//! Folding a buffered Codex event stream into a single response object.

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";

/// Event types that carry the finished response.
pub const TERMINAL_EVENTS: [&str; 2] = ["response.done", "response.completed"];

/// Return the `response` payload of the first terminal event in `text`.
///
/// Only `data: ` lines are considered; lines that fail to parse as JSON are
/// skipped. `None` means the stream ended without a terminal event.
#[must_use]
pub fn extract_terminal_response(text: &str) -> Option<Value> {
    text.lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .find(|event| {
            event
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| TERMINAL_EVENTS.contains(&t))
        })
        .map(|mut event| event.get_mut("response").map(Value::take).unwrap_or(Value::Null))
}
