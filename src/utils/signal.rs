//! Shutdown signal handling

use tokio::signal;
use tracing::{info, warn};

/// Resolve once SIGTERM, SIGINT or Ctrl+C arrives
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                signal::ctrl_c().await.ok();
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, stopping modules");
            }
            _ = signal::ctrl_c() => {
                info!("Received interrupt, stopping modules");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received interrupt, stopping modules"),
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    }
}
