//! Sigil Server - signed-request authentication in front of a demo endpoint.
//!
//! Every request goes through the access gate, signature verification, and
//! the authorization gate. Authenticated requests get a JSON description of
//! the calling account; `/login` trades a clear-text login for a bearer
//! token.
//!
//! # Usage
//!
//! ```text
//! SIGIL_ACCOUNTS=accounts.json SIGIL_ACCESS_TOKEN_SECRET=change-me sigil-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SIGIL_CONFIG` | *(unset)* | JSON configuration file |
//! | `SIGIL_ACCOUNTS` | *(unset)* | JSON file with an array of account records |
//! | `GATEWAY_LISTEN` | `0.0.0.0:8000` | Bind address |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! See [`SigilConfig::from_env`] for the signature and access variables.
//! On unix, `SIGHUP` reloads the configuration and swaps the access policy.

mod service;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use sigil_auth::{AccountRecord, CachedAccountStore, StaticAccountStore};
use sigil_core::SigilConfig;
use sigil_gate::{AuthPipeline, HookRegistry, PolicyStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::service::{ServerPipeline, SigilService};

/// Server version reported in health check responses.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Read account records from a JSON array file.
fn load_accounts(path: &Path) -> Result<Vec<AccountRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read accounts file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid accounts file {}", path.display()))
}

/// Build the account store from `SIGIL_ACCOUNTS`, empty when unset.
fn build_store() -> Result<CachedAccountStore<StaticAccountStore>> {
    let accounts = match std::env::var("SIGIL_ACCOUNTS") {
        Ok(path) if !path.is_empty() => load_accounts(Path::new(&path))?,
        _ => {
            warn!("SIGIL_ACCOUNTS is not set, every signed request will be rejected");
            Vec::new()
        }
    };
    info!(accounts = accounts.len(), "loaded account records");
    Ok(CachedAccountStore::new(StaticAccountStore::new(accounts)))
}

/// Reload the configuration on `SIGHUP` until the process exits.
#[cfg(unix)]
fn spawn_reload_on_hangup(policy: Arc<PolicyStore>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("cannot listen for SIGHUP")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("received SIGHUP, reloading configuration");
            match SigilConfig::from_env() {
                Ok(config) => {
                    if let Err(e) = policy.reload(&config) {
                        error!(error = %e, "invalid access policy, keeping the previous one");
                    }
                }
                Err(e) => error!(error = %e, "cannot reload configuration"),
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_policy: Arc<PolicyStore>) -> Result<()> {
    Ok(())
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, pipeline: Arc<ServerPipeline>) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = SigilService::new(Arc::clone(&pipeline), peer_addr.ip());
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = SigilConfig::from_env().context("cannot load configuration")?;
    init_tracing(&config.log_level)?;

    let policy = Arc::new(PolicyStore::from_config(&config).context("invalid access policy")?);
    let store = build_store()?;
    let pipeline = Arc::new(AuthPipeline::new(
        Arc::clone(&policy),
        store,
        Arc::new(HookRegistry::new()),
    ));
    spawn_reload_on_hangup(policy)?;

    let listen_addr = &config.gateway_listen;
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid bind address: {listen_addr}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        signature_header = %config.signature.header_name,
        version = VERSION,
        "starting Sigil Server",
    );

    serve(listener, pipeline).await
}
