//! HTTP proxy layer: axum router, the `/v1/responses` handler, response
//! adaptation, error mapping and the server lifecycle.

mod adapter;
mod error;
mod responses;
mod server;

pub use adapter::{UpstreamReply, adapt, is_usage_limit};
pub use error::ApiError;
pub use server::{ProxyServer, ServerInfo};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::Response,
    routing::post,
};
use codexgate_config::Config;
use codexgate_types::{CredentialSource, GateError};
use std::{any::Any, sync::Arc, time::Duration};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub config: Config,
    /// Hands out credentials that are valid for the duration of a request.
    pub credentials: Arc<dyn CredentialSource>,
    /// HTTP client for backend requests.
    pub http: rquest::Client,
}

impl AppState {
    /// Creates a new shared application state wrapped in an `Arc`.
    ///
    /// If the config specifies a `proxy_url`, the HTTP client is built with that proxy.
    pub fn new(config: Config, credentials: Arc<dyn CredentialSource>) -> Arc<Self> {
        let http = build_http_client(
            config.proxy_url.as_deref(),
            Duration::from_secs(config.upstream.connect_timeout_secs),
        );
        Arc::new(Self {
            config,
            credentials,
            http,
        })
    }
}

/// Build an HTTP client with a connect timeout, optionally routed through a proxy.
///
/// There is no total request timeout; backend streams can stay open for minutes.
pub fn build_http_client(proxy_url: Option<&str>, connect_timeout: Duration) -> rquest::Client {
    let mut builder = rquest::Client::builder().connect_timeout(connect_timeout);
    if let Some(url) = proxy_url {
        match rquest::Proxy::all(url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => {
                tracing::warn!(url = url, error = %e, "invalid proxy_url, using direct connection");
            }
        }
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to build HTTP client, using defaults");
        rquest::Client::new()
    })
}

/// Build the full axum router.
///
/// Routes:
/// - POST /v1/responses
///
/// Every other method or path answers 404 `{"error": "Not found"}`.
pub fn make_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.limits.max_body_bytes;
    Router::new()
        .route(
            "/v1/responses",
            post(responses::create_response).fallback(not_found),
        )
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

async fn not_found() -> ApiError {
    ApiError(GateError::NotFound)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "request handler panicked");
    error::error_response(StatusCode::INTERNAL_SERVER_ERROR, error::INTERNAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        Json,
        body::Body,
        http::{HeaderMap, Request},
    };
    use codexgate_types::Credentials;
    use http_body_util::BodyExt as _;
    use serde_json::{Value, json};
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use tower::ServiceExt as _;

    /// Credential source that counts calls and can be told to fail.
    struct FakeCredentials {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeCredentials {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl CredentialSource for FakeCredentials {
        async fn credentials(&self) -> codexgate_types::Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GateError::Auth("invalid_grant".into()));
            }
            Ok(Credentials {
                access_token: "tok".into(),
                account_id: "acct-1".into(),
            })
        }
    }

    /// What the fake backend saw on its last call.
    #[derive(Default)]
    struct Seen {
        headers: Option<HeaderMap>,
        body: Option<Value>,
    }

    /// Fake backend answering every POST with `status` and `body`.
    async fn spawn_backend(status: u16, body: &'static str, seen: Arc<Mutex<Seen>>) -> String {
        let app = Router::new().route(
            "/responses",
            post(move |headers: HeaderMap, Json(req): Json<Value>| {
                let seen = Arc::clone(&seen);
                async move {
                    let mut s = seen.lock().unwrap();
                    s.headers = Some(headers);
                    s.body = Some(req);
                    (
                        StatusCode::from_u16(status).unwrap(),
                        [("content-type", "text/event-stream")],
                        body,
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/responses")
    }

    fn router_with(backend_url: &str, creds: Arc<FakeCredentials>) -> Router {
        let mut config = Config::default();
        config.upstream.backend_url = backend_url.to_string();
        make_router(AppState::new(config, creds))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<B>(resp: axum::http::Response<B>) -> Value
    where
        B: axum::body::HttpBody,
        B::Error: std::fmt::Debug,
    {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const DONE_STREAM: &str = "data: {\"type\":\"response.output_text\"}\n\ndata: {\"type\":\"response.done\",\"response\":{\"id\":\"r1\"}}\n\n";

    #[tokio::test]
    async fn test_route_gating_runs_before_credentials() {
        let creds = FakeCredentials::ok();
        let app = router_with("http://unused.invalid/responses", Arc::clone(&creds));

        let requests = [
            Request::builder()
                .method("GET")
                .uri("/v1/responses")
                .body(Body::empty())
                .unwrap(),
            post_json("/other", "{}"),
            post_json("/v1/responses/extra", "{}"),
        ];
        for req in requests {
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(resp).await, json!({"error": "Not found"}));
        }
        assert_eq!(creds.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400_without_credentials() {
        let creds = FakeCredentials::ok();
        let app = router_with("http://unused.invalid/responses", Arc::clone(&creds));
        let resp = app
            .oneshot(post_json("/v1/responses", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({"error": "Invalid JSON body"}));
        assert_eq!(creds.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let mut config = Config::default();
        config.limits.max_body_bytes = 16;
        let app = make_router(AppState::new(config, FakeCredentials::ok()));
        let resp = app
            .oneshot(post_json(
                "/v1/responses",
                r#"{"model":"gpt-5.1","input":"a long prompt"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Request body too large"})
        );
    }

    #[tokio::test]
    async fn test_auth_failure_is_401_and_backend_untouched() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let url = spawn_backend(200, DONE_STREAM, Arc::clone(&seen)).await;
        let app = router_with(&url, FakeCredentials::failing());
        let resp = app
            .oneshot(post_json("/v1/responses", r#"{"model":"gpt-5.1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "OAuth token refresh failed. Re-authenticate."})
        );
        assert!(seen.lock().unwrap().body.is_none());
    }

    #[tokio::test]
    async fn test_non_streaming_request_gets_terminal_response() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let url = spawn_backend(200, DONE_STREAM, Arc::clone(&seen)).await;
        let app = router_with(&url, FakeCredentials::ok());
        let resp = app
            .oneshot(post_json(
                "/v1/responses",
                r#"{"model":"vendor/gpt-5.1-codex-high","stream":false,"store":true,"max_output_tokens":5,"input":[{"type":"item_reference","id":"a"},{"type":"message","id":"b","text":"x"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"id": "r1"}));

        let seen = seen.lock().unwrap();
        let headers = seen.headers.as_ref().unwrap();
        assert_eq!(headers["authorization"], "Bearer tok");
        assert_eq!(headers["chatgpt-account-id"], "acct-1");
        assert_eq!(headers["originator"], "codex_cli_rs");
        assert_eq!(headers["accept"], "text/event-stream");

        let body = seen.body.as_ref().unwrap();
        assert_eq!(body["model"], "gpt-5.1-codex");
        assert_eq!(body["stream"], true);
        assert_eq!(body["store"], false);
        assert_eq!(body["input"], json!([{"type": "message", "text": "x"}]));
        assert!(body.get("max_output_tokens").is_none());
        assert_eq!(body["include"], json!(["reasoning.encrypted_content"]));
    }

    #[tokio::test]
    async fn test_streaming_request_is_passed_through() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let url = spawn_backend(200, DONE_STREAM, seen).await;
        let app = router_with(&url, FakeCredentials::ok());
        let resp = app
            .oneshot(post_json("/v1/responses", r#"{"stream":true}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, DONE_STREAM.as_bytes());
    }

    #[tokio::test]
    async fn test_usage_limit_404_becomes_429() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let raw = r#"{"error":{"code":"usage_limit_reached"}}"#;
        let url = spawn_backend(404, raw, seen).await;
        let app = router_with(&url, FakeCredentials::ok());
        let resp = app
            .oneshot(post_json("/v1/responses", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, raw.as_bytes());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_502() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let app = router_with(
            &format!("http://127.0.0.1:{port}/responses"),
            FakeCredentials::ok(),
        );
        let resp = app
            .oneshot(post_json("/v1/responses", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Failed to reach ChatGPT backend"})
        );
    }

    /// Credential source that panics mid-request.
    struct PanickingCredentials;

    #[async_trait]
    impl CredentialSource for PanickingCredentials {
        async fn credentials(&self) -> codexgate_types::Result<Credentials> {
            panic!("credential store poisoned")
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_500_json() {
        let app = make_router(AppState::new(
            Config::default(),
            Arc::new(PanickingCredentials),
        ));
        let resp = app
            .oneshot(post_json("/v1/responses", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Internal proxy error"})
        );
    }
}
