use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::audit::{AuditSink, NoopAuditSink, SeaOrmAuditSink};
use crate::store::GameStore;

use super::logging::log_requests;
use super::ws::{ws_handler, WsState};

const LOG_TARGET: &str = "kvitlach::server::bootstrap";

pub const DEFAULT_WS_PORT: u16 = 3001;
pub const DEFAULT_HTTP_PORT: u16 = 3000;

pub struct ServerConfig {
    pub bind: IpAddr,
    pub ws_port: u16,
    pub http_port: u16,
    pub database_url: Option<String>,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let store = GameStore::new();
    let audit: Arc<dyn AuditSink> = match &config.database_url {
        Some(url) => match SeaOrmAuditSink::connect(url).await {
            Ok(sink) => {
                info!(target: LOG_TARGET, "connection audit sink enabled");
                Arc::new(sink)
            }
            Err(err) => {
                // Audit is best-effort; the game runs without it.
                warn!(
                    target: LOG_TARGET,
                    error = %err,
                    "audit sink unavailable, continuing without it"
                );
                Arc::new(NoopAuditSink)
            }
        },
        None => Arc::new(NoopAuditSink),
    };

    let ws_state = Arc::new(WsState::new(store, audit));
    let ws_router = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(ws_state);
    let health_router = Router::new()
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn(log_requests));

    let ws_addr = SocketAddr::new(config.bind, config.ws_port);
    let http_addr = SocketAddr::new(config.bind, config.http_port);

    let ws_listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("failed to bind {ws_addr}"))?;
    let http_listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;
    info!(target: LOG_TARGET, %ws_addr, %http_addr, "kvitlach server listening");

    let ws_server = axum::serve(
        ws_listener,
        ws_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());
    let http_server = axum::serve(http_listener, health_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(ws_server, http_server).context("server exited with error")?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target: LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target: LOG_TARGET, "shutdown signal received");
}
