//! `POST /v1/responses`: the one proxied route.

use axum::{
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
    response::Response,
};
use bytes::Bytes;
use codexgate_translate::{TransformedRequest, build_headers, parse_request, transform};
use codexgate_types::GateError;
use std::sync::Arc;

use crate::{
    AppState,
    adapter::{self, UpstreamReply},
    error::{ApiError, error_response},
};

/// Handles `POST /v1/responses`.
///
/// Order matters: the body is validated before any credential work, and
/// credentials are settled before anything is sent to the backend.
pub async fn create_response(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Ok(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ));
        }
        Err(_) => return Err(GateError::InvalidRequest("Invalid JSON body".into()).into()),
    };
    let request = parse_request(&body)?;

    let creds = state.credentials.credentials().await.map_err(|e| {
        tracing::warn!(error = %e, "no usable credentials");
        if e.is_auth() {
            e
        } else {
            GateError::Auth(e.to_string())
        }
    })?;

    let TransformedRequest {
        body,
        was_streaming,
    } = transform(request);
    tracing::info!(
        model = body.model.as_deref().unwrap_or_default(),
        stream = was_streaming,
        account_id = %creds.account_id,
        "forwarding request"
    );

    let mut upstream = state.http.post(&state.config.upstream.backend_url);
    for (name, value) in build_headers(&creds.access_token, &creds.account_id) {
        upstream = upstream.header(name, value);
    }
    let resp = upstream.json(&body).send().await.map_err(|e| {
        tracing::warn!(error = %e, "backend request failed");
        GateError::Http(e.to_string())
    })?;

    Ok(adapter::adapt(UpstreamReply::from_rquest(resp), was_streaming).await)
}
