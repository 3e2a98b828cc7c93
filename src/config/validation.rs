//! Configuration validation.
//!
//! clap handles the syntactic layer (required fields, enum values); this
//! module covers the semantic checks that must pass before the proxy is
//! allowed to serve.

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// Error type for semantic configuration failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base URL is not parseable: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("base URL must use http or https, got {0}")]
    UnsupportedScheme(String),
}

/// Validate the configuration and return the parsed backend base URL.
pub fn validate(config: &ProxyConfig) -> Result<Url, ConfigError> {
    let base = Url::parse(&config.baseurl)?;

    match base.scheme() {
        "http" | "https" => Ok(base),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
