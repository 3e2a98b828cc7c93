//! Access control for the proxy itself.
//!
//! The gate enforces an optional shared secret, independent of the backend's
//! own authentication. It decides before anything is sent upstream: a denied
//! request never reaches the backend.

pub mod access_gate;

pub use access_gate::{AccessGate, Decision, AUTH_COOKIE};
