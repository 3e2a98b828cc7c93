//! OS signal handling.

use crate::lifecycle::Shutdown;

/// Relay Ctrl+C into the shutdown broadcast.
pub async fn relay(shutdown: Shutdown) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
        shutdown.trigger();
    }
}
