//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Session acquisition:
//!     → backoff.rs, unbounded policy (retry forever, abort only on shutdown)
//!
//! Request forwarding:
//!     → backoff.rs, time-boxed policy (5s wall-clock budget per request)
//!     → budget exhausted: last failure surfaces to the caller
//! ```
//!
//! # Design Decisions
//! - Attempt outcomes are a tagged enum so terminal results (gate rejection,
//!   successful upstream response) never consume retry budget
//! - Jittered backoff prevents thundering herd against a recovering backend
//! - The time-boxed policy also bounds the in-flight attempt; a re-login that
//!   outlives the budget is abandoned, not awaited

pub mod backoff;

pub use backoff::{Attempt, BackoffPolicy, RetryError};
