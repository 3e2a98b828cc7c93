//! Authenticating reverse proxy for a form-login, cookie-session backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                GRAFANA PROXY                  │
//!                      │                                               │
//!  Client Request      │  ┌──────────┐    ┌─────────────────────┐     │
//!  ────────────────────┼─▶│ security │───▶│     http::server    │     │
//!                      │  │   gate   │    │ (forwarding pipeline)│     │
//!                      │  └──────────┘    └──────────┬──────────┘     │
//!                      │                             │ 401            │
//!                      │                             ▼                │
//!                      │                      ┌──────────────┐        │
//!                      │                      │   session    │────────┼──── POST /login
//!                      │                      │   manager    │        │
//!                      │                      └──────┬───────┘        │
//!                      │                             │ cookie jar     │
//!  Client Response     │                             ▼                │
//!  ◀───────────────────┼──────────────────── shared transport ────────┼──── Backend
//!                      │                                               │
//!                      │  Cross-cutting: config · resilience (backoff) │
//!                      │  observability (tracing) · lifecycle          │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use grafana_proxy::config::{self, ProxyConfig};
use grafana_proxy::http::HttpServer;
use grafana_proxy::lifecycle::{signals, Shutdown};
use grafana_proxy::observability::logging;
use grafana_proxy::security::AccessGate;
use grafana_proxy::session::{Credentials, SessionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ProxyConfig::parse();

    logging::init(config.log_format);

    let base = match config::validate(&config) {
        Ok(base) => base,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        base_url = %base,
        listen = %config.listen,
        gate_enabled = config.token.is_some(),
        "configuration loaded"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::relay(shutdown.clone()));

    let credentials = Credentials {
        user: config.user.clone(),
        pass: config.pass.clone(),
    };
    let session = Arc::new(SessionManager::new(&base, credentials, shutdown.clone())?);

    // First login before the listener opens. Retries forever until the
    // backend accepts; only a shutdown signal gets us out early.
    if session.authenticate().await.is_err() {
        tracing::info!("shutdown before initial login completed");
        return Ok(());
    }

    let listener = TcpListener::bind(&config.listen).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for connections");

    let gate = AccessGate::new(config.token.clone());
    let server = HttpServer::new(base, session, gate);
    server.run(listener, shutdown).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
