use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use codexgate_auth::{TokenManager, initialize, select_source};
use codexgate_config::{Config, LogConfig, LogFormat, RelayConfig};
use codexgate_proxy::{ProxyServer, build_http_client};
use codexgate_types::{RefreshSource, now_ms};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

#[derive(Parser, Debug)]
#[command(
    name = "codexgate",
    about = "codexgate: local proxy from Codex CLI clients to the ChatGPT backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server.
    Serve(ServeArgs),
    /// Decode an access token and show its account and expiry.
    Status {
        #[arg(long, env = "CODEX_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to a YAML (or `.json`) configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the listening address (default: 127.0.0.1).
    #[arg(long)]
    host: Option<String>,
    /// Override the listening port (default: 0, ephemeral).
    #[arg(short, long)]
    port: Option<u16>,
    /// Write `{"port", "processId"}` here once listening.
    #[arg(long, value_name = "FILE")]
    server_info: Option<PathBuf>,
    #[arg(long, env = "CODEX_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,
    #[arg(long, env = "CODEX_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,
    /// Fetch fresh access tokens from this relay instead of refreshing directly.
    #[arg(long, env = "CODEX_RELAY_URL")]
    relay_url: Option<String>,
    #[arg(long, env = "CODEX_RELAY_KEY", hide_env_values = true)]
    relay_key: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::Status { access_token } => cmd_status(&access_token),
    }
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config error: {e}"))?;

    if let Some(h) = args.host {
        config.host = h;
    }
    if let Some(p) = args.port {
        config.port = p;
    }
    if let Some(path) = args.server_info {
        config.server_info_file = Some(path);
    }
    if let Some(url) = args.relay_url {
        let api_key = args
            .relay_key
            .or_else(|| config.relay.take().and_then(|r| r.api_key));
        config.relay = Some(RelayConfig { url, api_key });
    } else if let (Some(key), Some(relay)) = (args.relay_key, config.relay.as_mut()) {
        relay.api_key = Some(key);
    }

    let _guard = init_tracing(&config.log)?;

    let source = select_source(
        args.refresh_token,
        config.relay.as_ref().map(|r| r.url.clone()),
        config.relay.as_ref().and_then(|r| r.api_key.clone()),
    );
    let state = initialize(&args.access_token, source)?;
    tracing::info!(
        account_id = %state.account_id,
        expires_at = state.expires_at,
        relay = state.is_relay(),
        "token state initialized"
    );

    let http = build_http_client(
        config.proxy_url.as_deref(),
        Duration::from_secs(config.upstream.connect_timeout_secs),
    );
    let manager = Arc::new(TokenManager::new(
        state,
        http,
        config.upstream.token_url.clone(),
    ));

    let mut server = ProxyServer::new(config, manager);
    let info = server.start().await?;
    eprintln!("codexgate listening on http://{}", info.addr);

    let signalled = tokio::select! {
        () = shutdown_signal() => true,
        res = server.wait() => {
            res?;
            false
        }
    };
    if signalled {
        server.stop().await?;
    }
    Ok(())
}

fn cmd_status(access_token: &str) -> Result<()> {
    let state = initialize(
        access_token,
        RefreshSource::AuthServer {
            refresh_token: String::new(),
        },
    )?;

    println!("account: {}", state.account_id);
    if state.expires_at == 0 {
        println!("expires: unknown (token has no exp claim)");
    } else {
        let now = now_ms();
        if state.expires_at > now {
            println!(
                "expires: in {}s (at {} ms since epoch)",
                (state.expires_at - now) / 1000,
                state.expires_at
            );
        } else {
            println!(
                "expires: {}s ago (at {} ms since epoch)",
                (now - state.expires_at) / 1000,
                state.expires_at
            );
        }
    }
    let due = if state.needs_refresh() { "due" } else { "not due" };
    println!("refresh: {due}");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
fn init_tracing(log: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let (writer, guard) = match &log.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log.file has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = guard.is_none();

    match log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer))
            .try_init()?,
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(ansi).with_writer(writer))
            .try_init()?,
    }
    Ok(guard)
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
