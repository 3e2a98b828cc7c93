//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line flags / environment
//!     → schema.rs (clap derive: parse, defaults, usage on missing fields)
//!     → validation.rs (semantic checks: base URL parses, scheme supported)
//!     → ProxyConfig (validated, immutable)
//!     → shared with the session manager and forwarding pipeline
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - Missing credentials or base URL surface as a clap usage message
//! - Validation separates syntactic (clap) from semantic checks

pub mod schema;
pub mod validation;

pub use schema::{LogFormat, ProxyConfig};
pub use validation::{validate, ConfigError};
