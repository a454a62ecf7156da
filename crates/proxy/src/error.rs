//! API error type that maps [`GateError`] variants to HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codexgate_types::GateError;
use serde_json::json;

pub(crate) const AUTH_FAILED: &str = "OAuth token refresh failed. Re-authenticate.";
pub(crate) const BACKEND_UNREACHABLE: &str = "Failed to reach ChatGPT backend";
pub(crate) const INTERNAL: &str = "Internal proxy error";

/// Wrapper around [`GateError`] that implements [`IntoResponse`].
#[derive(Debug)]
pub struct ApiError(pub GateError);

impl ApiError {
    /// Returns `(status, client-facing message)` for the wrapped error.
    ///
    /// Only request validation errors echo their own message; everything else
    /// gets a fixed string so upstream details never leak to the client.
    fn classify(&self) -> (StatusCode, String) {
        match &self.0 {
            GateError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GateError::NotFound => (StatusCode::NOT_FOUND, "Not found".into()),
            GateError::Auth(_) | GateError::Relay(_) => {
                (StatusCode::UNAUTHORIZED, AUTH_FAILED.into())
            }
            GateError::Http(_) => (StatusCode::BAD_GATEWAY, BACKEND_UNREACHABLE.into()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.into()),
        }
    }
}

/// Flat `{"error": message}` JSON response.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        }
        error_response(status, &msg)
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        Self(e)
    }
}
