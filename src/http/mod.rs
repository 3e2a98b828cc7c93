//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, forwarding pipeline per request)
//!     → request.rs (target rewrite, outbound header preparation)
//!     → [session transport dispatches to the backend]
//!     → response.rs (verbatim header copy, counted body stream)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::HttpServer;
