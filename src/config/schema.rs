//! Configuration schema definitions.
//!
//! All settings come from command line flags or environment variables; the
//! environment names match what deployments of this proxy historically used.

use clap::{Parser, ValueEnum};

/// Runtime configuration for the proxy.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "grafana-proxy",
    about = "Authenticating reverse proxy for a form-login, cookie-session backend"
)]
pub struct ProxyConfig {
    /// Username for the backend login form.
    #[arg(short = 'u', long, env = "USER")]
    pub user: String,

    /// Password for the backend login form.
    #[arg(short = 'p', long, env = "PASS")]
    pub pass: String,

    /// Base URL (excluding last /) of the backend.
    #[arg(long, env = "BASEURL")]
    pub baseurl: String,

    /// IP/port to listen on.
    #[arg(long, default_value = "127.0.0.1:8081")]
    pub listen: String,

    /// Optional access secret; when set, clients must present it via the
    /// `?token=xyz` query parameter or the long-lived auth cookie.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// Output format for logs.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output.
    Text,
    /// One JSON object per line.
    Json,
}
