//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`; text for humans, JSON for shippers
//! - A request ID generated at the edge flows through every record and is
//!   forwarded upstream as `x-request-id`
//! - One terminal record per request (status, bytes sent); retry attempts
//!   log at debug/error level but never duplicate the terminal record

pub mod logging;
