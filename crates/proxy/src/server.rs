//! Listener lifecycle: bind, publish the server-info file, serve, shut down.

use codexgate_config::Config;
use codexgate_types::{CredentialSource, GateError, Result};
use serde::Serialize;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::{AppState, make_router};

/// Where a started server is listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    pub addr: SocketAddr,
    pub port: u16,
    pub process_id: u32,
}

/// On-disk shape of the server-info file.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoFile {
    port: u16,
    process_id: u32,
}

/// The proxy: one listener and one credential source for its whole lifetime.
pub struct ProxyServer {
    config: Config,
    credentials: Arc<dyn CredentialSource>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ProxyServer {
    pub fn new(config: Config, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            config,
            credentials,
            shutdown: None,
            task: None,
        }
    }

    /// Validate credentials, bind, publish the server-info file and start serving.
    ///
    /// # Errors
    ///
    /// Fails if the server is already running, the eager credential check
    /// fails (refresh included), the address cannot be bound, or the
    /// server-info file cannot be written.
    pub async fn start(&mut self) -> Result<ServerInfo> {
        if self.task.is_some() {
            return Err(GateError::Config("server already started".into()));
        }

        let creds = self.credentials.credentials().await?;
        tracing::debug!(account_id = %creds.account_id, "credentials ready");

        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        let addr = listener.local_addr()?;
        let info = ServerInfo {
            addr,
            port: addr.port(),
            process_id: std::process::id(),
        };

        if let Some(path) = &self.config.server_info_file {
            write_server_info(path, &info).await?;
        }

        let app = make_router(AppState::new(
            self.config.clone(),
            Arc::clone(&self.credentials),
        ));
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    rx.await.ok();
                })
                .await
        });

        tracing::info!(%addr, port = info.port, "proxy listening");
        self.shutdown = Some(tx);
        self.task = Some(task);
        Ok(info)
    }

    /// Stop accepting connections and wait for the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Io`] if the server task failed.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            tracing::info!("shutting down proxy");
            // The receiver is gone only if the server already exited.
            tx.send(()).ok();
        }
        self.wait().await
    }

    /// Wait for the server task to end without signalling it.
    ///
    /// Cancel-safe: dropping the future leaves the task in place, so a later
    /// [`stop`](Self::stop) still waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Io`] if serving failed or the task panicked.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        self.shutdown = None;
        joined.map_err(std::io::Error::other)??;
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

async fn write_server_info(path: &Path, info: &ServerInfo) -> Result<()> {
    let json = serde_json::to_vec(&ServerInfoFile {
        port: info.port,
        process_id: info.process_id,
    })?;
    tokio::fs::write(path, json).await?;
    tracing::debug!(path = %path.display(), "wrote server info file");
    Ok(())
}
