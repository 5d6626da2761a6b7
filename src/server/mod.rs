//! HTTP server for duckgate
//!
//! - [`http`] - Router assembly
//! - [`query_api`] - `POST /query` and `POST /streaming-query`
//! - [`middleware`] - Request ids, CORS and authentication
//! - [`shutdown`] - Signal handling for graceful shutdown

pub mod http;
pub mod middleware;
pub mod query_api;
pub mod shutdown;

pub use http::build_router;

use duckgate_engine::EngineSession;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// Bind the listener and serve until a shutdown signal arrives.
pub async fn run_server(config: GatewayConfig, session: Arc<EngineSession>) -> Result<()> {
    let addr = config.listen_addr;
    let app = build_router(session, config.auth);

    let listener = bind(addr).await?;
    info!(addr = %addr, "duckgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .map_err(|e| GatewayError::Server(format!("HTTP server failed: {}", e)))?;

    info!("Server stopped");
    Ok(())
}

async fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            let port = addr.port();
            GatewayError::Server(format!(
                "HTTP port {} is already in use. \
                 Fix: Use --port {} (or PORT={}) to pick a different port, \
                 or stop the existing process.",
                port,
                port.wrapping_add(1),
                port.wrapping_add(1)
            ))
        } else {
            GatewayError::Server(format!("Failed to bind HTTP server to {}: {}", addr, e))
        }
    })
}
