//! Owner of the process-wide OAuth token state.
//!
//! Responsibilities:
//! - Hand out credentials, refreshing first when the token is within the margin.
//! - Dispatch to the auth server or the relay, as fixed at construction.
//! - Single-flight refreshes: concurrent callers wait for one in-progress
//!   refresh instead of racing their own, and share its outcome whether it
//!   succeeded or failed.
use async_trait::async_trait;
use codexgate_types::{
    CredentialSource, Credentials, GateError, RefreshSource, Result, TokenState,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::{
    codex::{self, RefreshOutcome},
    jwt, relay,
};

pub struct TokenManager {
    state: RwLock<TokenState>,
    /// Held for the whole duration of a refresh round-trip. Holds the error of
    /// the last attempt if it failed.
    refresh_lock: Mutex<Option<GateError>>,
    /// Completed refresh attempts, successful or not.
    attempts: AtomicU64,
    http: rquest::Client,
    token_url: String,
}

impl TokenManager {
    pub fn new(state: TokenState, http: rquest::Client, token_url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(state),
            refresh_lock: Mutex::new(None),
            attempts: AtomicU64::new(0),
            http,
            token_url: token_url.into(),
        }
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> TokenState {
        self.state.read().await.clone()
    }

    /// Return credentials that are valid beyond the refresh margin.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Auth`] if the auth-server refresh fails or the new
    /// token carries no account id, and [`GateError::Relay`] if the relay fetch fails.
    pub async fn ensure_valid(&self) -> Result<Credentials> {
        let seen = self.attempts.load(Ordering::Acquire);
        {
            let state = self.state.read().await;
            if !state.needs_refresh() {
                return Ok(state.credentials());
            }
        }

        let mut last_failure = self.refresh_lock.lock().await;

        // Another caller may have finished a refresh while we waited.
        let mut next = {
            let state = self.state.read().await;
            if !state.needs_refresh() {
                return Ok(state.credentials());
            }
            state.clone()
        };
        if self.attempts.load(Ordering::Acquire) != seen
            && let Some(err) = last_failure.as_ref()
        {
            return Err(replay(err));
        }

        let result = self.refresh(&mut next).await;
        self.attempts.fetch_add(1, Ordering::Release);
        if let Err(e) = result {
            *last_failure = Some(replay(&e));
            return Err(e);
        }
        *last_failure = None;

        let creds = next.credentials();
        tracing::info!(
            account_id = %next.account_id,
            expires_at = next.expires_at,
            relay = next.is_relay(),
            "access token refreshed"
        );
        *self.state.write().await = next;
        Ok(creds)
    }

    async fn refresh(&self, state: &mut TokenState) -> Result<()> {
        match &state.source {
            RefreshSource::Relay { .. } => {
                tracing::debug!("refreshing access token via relay");
                relay::refresh_via_relay(&self.http, state)
                    .await
                    .inspect_err(|e| tracing::warn!(error = %e, "relay refresh failed"))
            }
            RefreshSource::AuthServer { refresh_token } => {
                tracing::debug!("refreshing access token via auth server");
                let outcome =
                    codex::refresh_via_auth_server(&self.http, &self.token_url, refresh_token)
                        .await;
                apply_outcome(state, outcome)
            }
        }
    }
}

/// Commit a refresh outcome to `state`, re-deriving the account id.
fn apply_outcome(state: &mut TokenState, outcome: RefreshOutcome) -> Result<()> {
    match outcome {
        RefreshOutcome::Refreshed {
            access_token,
            refresh_token,
            expires_at,
        } => {
            let account_id = jwt::derive_account_id(&access_token)?;
            state.replace_access_token(access_token, expires_at, account_id);
            state.source = RefreshSource::AuthServer { refresh_token };
            Ok(())
        }
        RefreshOutcome::Failed { reason } => {
            tracing::warn!(reason = %reason, "auth server refresh failed");
            Err(GateError::Auth(reason))
        }
    }
}

/// Copy of a refresh failure for a caller that queued behind the attempt.
fn replay(err: &GateError) -> GateError {
    match err {
        GateError::Relay(msg) => GateError::Relay(msg.clone()),
        GateError::Auth(msg) => GateError::Auth(msg.clone()),
        other => GateError::Auth(other.to_string()),
    }
}

#[async_trait]
impl CredentialSource for TokenManager {
    async fn credentials(&self) -> Result<Credentials> {
        self.ensure_valid().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account_token, spawn_server};
    use axum::{Json, Router, http::StatusCode, routing::post};
    use codexgate_types::now_ms;
    use serde_json::json;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use std::time::Duration;

    fn auth_state(access_token: String, expires_at: u64) -> TokenState {
        TokenState {
            access_token,
            expires_at,
            account_id: "acct-old".into(),
            source: RefreshSource::AuthServer {
                refresh_token: "rt-old".into(),
            },
        }
    }

    /// Token endpoint that counts hits and answers after a short delay.
    async fn counting_token_server(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/token",
            post(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Json(json!({
                        "access_token": account_token("acct-new", 4_000_000_000),
                        "refresh_token": "rt-new",
                        "expires_in": 3600,
                    }))
                }
            }),
        );
        format!("{}/token", spawn_server(app).await)
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = counting_token_server(Arc::clone(&hits)).await;
        let m = TokenManager::new(
            auth_state("current".into(), now_ms() + 3_600_000),
            rquest::Client::new(),
            url,
        );
        let creds = m.ensure_valid().await.unwrap();
        assert_eq!(creds.access_token, "current");
        assert_eq!(creds.account_id, "acct-old");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = counting_token_server(Arc::clone(&hits)).await;
        let m = TokenManager::new(auth_state("stale".into(), 0), rquest::Client::new(), url);

        let creds = m.ensure_valid().await.unwrap();
        assert_eq!(creds.account_id, "acct-new");
        assert_ne!(creds.access_token, "stale");

        let state = m.snapshot().await;
        assert_eq!(
            state.source,
            RefreshSource::AuthServer {
                refresh_token: "rt-new".into()
            }
        );
        assert!(!state.needs_refresh());
        assert_eq!(
            state.account_id,
            jwt::derive_account_id(&state.access_token).unwrap()
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = counting_token_server(Arc::clone(&hits)).await;
        let m = Arc::new(TokenManager::new(
            auth_state("stale".into(), 0),
            rquest::Client::new(),
            url,
        ));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let m = Arc::clone(&m);
                tokio::spawn(async move { m.ensure_valid().await })
            })
            .collect();
        for task in tasks {
            let creds = task.await.unwrap().unwrap();
            assert_eq!(creds.account_id, "acct-new");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failed_refresh() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/token",
            post(move || {
                let hits = Arc::clone(&counter);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    (StatusCode::UNAUTHORIZED, "invalid_grant")
                }
            }),
        );
        let url = format!("{}/token", spawn_server(app).await);
        let m = Arc::new(TokenManager::new(
            auth_state("stale".into(), 0),
            rquest::Client::new(),
            url,
        ));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let m = Arc::clone(&m);
                tokio::spawn(async move { m.ensure_valid().await })
            })
            .collect();
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, GateError::Auth(_)));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A request arriving after the failure settled tries again.
        assert!(m.ensure_valid().await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_auth_error_and_keeps_state() {
        let app = Router::new().route(
            "/token",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid_grant") }),
        );
        let url = format!("{}/token", spawn_server(app).await);
        let m = TokenManager::new(auth_state("stale".into(), 0), rquest::Client::new(), url);

        let err = m.ensure_valid().await.unwrap_err();
        assert!(matches!(err, GateError::Auth(_)));
        assert_eq!(m.snapshot().await.access_token, "stale");
    }

    #[tokio::test]
    async fn test_refreshed_token_without_account_is_auth_error() {
        let app = Router::new().route(
            "/token",
            post(|| async {
                Json(json!({"access_token": "opaque", "refresh_token": "r", "expires_in": 60}))
            }),
        );
        let url = format!("{}/token", spawn_server(app).await);
        let m = TokenManager::new(auth_state("stale".into(), 0), rquest::Client::new(), url);

        let err = m.ensure_valid().await.unwrap_err();
        assert!(matches!(err, GateError::Auth(_)));
    }

    #[tokio::test]
    async fn test_relay_mode_never_touches_token_endpoint() {
        let app = Router::new().route(
            "/relay",
            axum::routing::get(|| async {
                Json(json!({
                    "access_token": account_token("acct-relay", 4_000_000_000),
                    "expires_at": 4_000_000_000_000_u64,
                }))
            }),
        );
        let relay_url = format!("{}/relay", spawn_server(app).await);
        let state = TokenState {
            access_token: "stale".into(),
            expires_at: 0,
            account_id: "acct-old".into(),
            source: RefreshSource::Relay {
                url: relay_url,
                api_key: None,
            },
        };
        let m = TokenManager::new(state, rquest::Client::new(), "http://unused.invalid/token");

        let creds = m.ensure_valid().await.unwrap();
        assert_eq!(creds.account_id, "acct-relay");
        assert!(m.snapshot().await.is_relay());
    }

    #[tokio::test]
    async fn test_credential_source_dispatches_to_ensure_valid() {
        let m: Arc<dyn CredentialSource> = Arc::new(TokenManager::new(
            auth_state("current".into(), now_ms() + 3_600_000),
            rquest::Client::new(),
            "http://unused.invalid/token",
        ));
        assert_eq!(m.credentials().await.unwrap().access_token, "current");
    }
}
