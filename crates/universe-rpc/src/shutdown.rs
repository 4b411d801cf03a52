//! Graceful shutdown.

use tokio::signal;
use tracing::{error, info};

use crate::tracing::prefix::PULSE_CLOSE;

/// Resolves when Ctrl+C or (on Unix) SIGTERM is received.
///
/// A signal whose handler cannot be installed never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("{} Received Ctrl+C, shutting down", PULSE_CLOSE);
        }
        _ = terminate => {
            info!("{} Received terminate signal, shutting down", PULSE_CLOSE);
        }
    }
}
