//! Pure request/response rewriting between Codex CLI clients and the
//! `ChatGPT` Codex backend. No I/O happens in this crate.

pub mod models;
pub mod request;
pub mod sse;

pub use models::{DEFAULT_MODEL, normalize_model};
pub use request::{
    Input, InputEntry, InputItem, Reasoning, ResponsesRequest, TransformedRequest, build_headers,
    parse_request, transform,
};
pub use sse::extract_terminal_response;
