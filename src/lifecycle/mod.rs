//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse config → Validate → First login → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → server drains connections → login retry loop aborts
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
