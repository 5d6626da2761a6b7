//! Shutdown signal handling for the HTTP server
//!
//! [`shutdown_signal`] resolves on Ctrl+C or, on Unix, SIGTERM. It is passed
//! to `axum::serve(...).with_graceful_shutdown`, which stops accepting new
//! connections and lets in-flight requests finish. In-flight Arrow streams
//! are dropped with their connections, which cancels their workers.

use tokio::signal;
use tracing::{info, warn};

/// Wait for a shutdown signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
