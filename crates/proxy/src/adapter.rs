//! Turns a backend reply into the response the client asked for.
//!
//! | Backend reply | Client gets |
//! |---|---|
//! | 404 with a usage-limit marker | 429, same body |
//! | any other non-2xx | same status and body |
//! | 2xx, client streaming | SSE chunks forwarded as they arrive |
//! | 2xx, client not streaming | the terminal event's `response` object, or the raw stream text |

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use codexgate_translate::extract_terminal_response;
use codexgate_types::{ByteStream, GateError};
use futures_util::TryStreamExt as _;
use std::convert::Infallible;
use tokio_stream::StreamExt as _;

use crate::error::error_response;

/// Case-insensitive markers the backend puts in a 404 body when the account
/// is out of quota rather than the resource missing.
const USAGE_LIMIT_MARKERS: [&str; 3] = [
    "usage_limit_reached",
    "usage_not_included",
    "rate_limit_exceeded",
];

const EMPTY_BODY: &str = "Empty response from ChatGPT backend";
const READ_FAILED: &str = "Failed to read ChatGPT backend response";

/// Backend response, detached from the HTTP client that produced it.
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl UpstreamReply {
    pub fn from_rquest(resp: rquest::Response) -> Self {
        let status =
            StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Self {
            status,
            content_type,
            body: Box::pin(resp.bytes_stream().map_err(GateError::from)),
        }
    }
}

/// Build the client response for `reply`. Never fails: every path produces a response.
pub async fn adapt(reply: UpstreamReply, was_streaming: bool) -> Response {
    let UpstreamReply {
        status,
        content_type,
        body,
    } = reply;

    if status == StatusCode::NOT_FOUND {
        return remap_not_found(content_type, body).await;
    }
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "backend returned error status");
        return (
            status,
            [(header::CONTENT_TYPE, content_type_or_json(content_type))],
            Body::from_stream(body),
        )
            .into_response();
    }

    if was_streaming {
        passthrough(body)
    } else {
        buffered(body).await
    }
}

fn content_type_or_json(content_type: Option<String>) -> String {
    content_type.unwrap_or_else(|| "application/json".to_string())
}

#[must_use]
pub fn is_usage_limit(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    USAGE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// The body is forwarded byte for byte; only the status may change.
async fn remap_not_found(content_type: Option<String>, body: ByteStream) -> Response {
    let bytes = match drain(body).await {
        (bytes, None) => bytes,
        (_, Some(e)) => {
            tracing::warn!(error = %e, "failed to read backend 404 body");
            Vec::new()
        }
    };

    let status = if is_usage_limit(&String::from_utf8_lossy(&bytes)) {
        tracing::info!("backend 404 carries a usage-limit marker, answering 429");
        StatusCode::TOO_MANY_REQUESTS
    } else {
        tracing::warn!(status = 404, "backend returned error status");
        StatusCode::NOT_FOUND
    };
    (
        status,
        [(header::CONTENT_TYPE, content_type_or_json(content_type))],
        Bytes::from(bytes),
    )
        .into_response()
}

/// Forward chunks verbatim. A read error ends the body cleanly.
fn passthrough(body: ByteStream) -> Response {
    let chunks = body.map_while(|chunk| match chunk {
        Ok(bytes) => Some(Ok::<Bytes, Infallible>(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "backend stream read failed, closing client stream");
            None
        }
    });
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}

/// Read the whole stream and fold it into one JSON document.
async fn buffered(body: ByteStream) -> Response {
    let (bytes, err) = drain(body).await;
    if let Some(e) = err {
        tracing::warn!(error = %e, received = bytes.len(), "backend stream read failed");
        if bytes.is_empty() {
            return error_response(StatusCode::BAD_GATEWAY, READ_FAILED);
        }
    }
    if bytes.is_empty() {
        return error_response(StatusCode::BAD_GATEWAY, EMPTY_BODY);
    }

    let text = String::from_utf8_lossy(&bytes);
    match extract_terminal_response(&text) {
        Some(response) => (StatusCode::OK, axum::Json(response)).into_response(),
        None => {
            tracing::warn!("no terminal event in backend stream, returning raw text");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/event-stream")],
                text.into_owned(),
            )
                .into_response()
        }
    }
}

/// Collect chunks until the stream ends or fails. Bytes read before a
/// failure are kept.
async fn drain(mut body: ByteStream) -> (Vec<u8>, Option<GateError>) {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(e) => return (buf, Some(e)),
        }
    }
    (buf, None)
}
