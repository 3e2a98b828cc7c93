//! HTTP server setup and the per-request forwarding pipeline.
//!
//! # Responsibilities
//! - Create the Axum router: every method, every path, one handler
//! - Run the pipeline per request:
//!   gate check → rewrite → dispatch → interpret → respond
//! - Re-authenticate inline on a 401 and retry the dispatch
//! - Keep the whole retry loop inside the 5s forwarding budget
//!
//! # Design Decisions
//! - The gate verdict is decided before the retry loop; a rejection never
//!   consumes budget and never reaches the backend
//! - The inbound body is captured once and replayed on every attempt, so the
//!   outbound request bytes are identical across retries
//! - Budget exhaustion answers 500 with the last failure's text; the
//!   pipeline always produces a response

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::Url;
use uuid::Uuid;

use crate::http::request::{forward_headers, rewrite_target};
use crate::http::response::{upstream_response, RequestLog};
use crate::lifecycle::Shutdown;
use crate::resilience::{Attempt, BackoffPolicy, RetryError};
use crate::security::{AccessGate, Decision};
use crate::session::SessionManager;

/// Wall-clock budget for forwarding one inbound request, re-login included.
const FORWARD_BUDGET: Duration = Duration::from_secs(5);

/// Cap on the inbound body buffered for replay across retry attempts.
const MAX_INBOUND_BODY: usize = 16 * 1024 * 1024;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub gate: AccessGate,
    pub base: Url,
}

/// Failures the dispatch loop may retry.
#[derive(Debug, Error)]
enum ForwardError {
    #[error("upstream request failed: {0}")]
    Upstream(reqwest::Error),

    #[error("backend session expired, re-login performed")]
    NeedsRelogin,
}

/// HTTP entry point: binds the forwarding pipeline to a listener.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(base: Url, session: Arc<SessionManager>, gate: AccessGate) -> Self {
        let state = AppState {
            session,
            gate,
            base,
        };
        let router = Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http());
        Self { router }
    }

    /// Run the server until shutdown, draining in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        tracing::info!(address = %listener.local_addr()?, "HTTP server starting");

        let mut rx = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// The forwarding pipeline for one inbound request.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = Uuid::new_v4();
    let (parts, body) = request.into_parts();
    let log = RequestLog::new(request_id, &parts.method, &parts.uri, &parts.headers);

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %log.path,
        "proxying request"
    );

    // Gate check: terminal either way, never part of the retry loop.
    let issue_cookie = match state.gate.check(&parts.uri, &parts.headers) {
        Decision::Deny => {
            log.denied();
            return (
                StatusCode::FORBIDDEN,
                "Please add the `?token=xyz` parameter with the correct token\n",
            )
                .into_response();
        }
        Decision::Allow { issue_cookie } => issue_cookie,
    };

    // Capture the body once so every retry replays identical bytes.
    let body_bytes = match axum::body::to_bytes(body, MAX_INBOUND_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large\n").into_response();
        }
    };

    let target = rewrite_target(&state.base, &parts.uri);
    let headers = forward_headers(&parts.headers, &request_id.to_string());

    match dispatch(
        &state,
        &log,
        &parts.method,
        &target,
        &headers,
        &body_bytes,
        &issue_cookie,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => {
            log.failed(&err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("proxying failed: {}\n", err),
            )
                .into_response()
        }
    }
}

/// Dispatch-and-interpret under the time-boxed policy.
///
/// Each attempt builds a fresh outbound request from the immutable template.
/// A 401 renews the session inline (single-flight across concurrent
/// requests) and reports retryable so the next attempt runs with fresh
/// cookies.
async fn dispatch(
    state: &AppState,
    log: &RequestLog,
    method: &Method,
    target: &Url,
    headers: &HeaderMap,
    body: &Bytes,
    issue_cookie: &Option<String>,
) -> Result<Response, RetryError<ForwardError>> {
    let policy = BackoffPolicy::time_boxed(FORWARD_BUDGET);

    policy
        .run(move |attempt| async move {
            if attempt > 0 {
                tracing::debug!(
                    request_id = %log.request_id,
                    attempt = attempt,
                    "retrying dispatch"
                );
            }

            let generation = state.session.generation();
            let sent = state
                .session
                .client()
                .request(method.clone(), target.clone())
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(
                        request_id = %log.request_id,
                        error = %err,
                        "upstream request failed"
                    );
                    return Attempt::Retry(ForwardError::Upstream(err));
                }
            };

            if response.status() == StatusCode::UNAUTHORIZED {
                // The backend rejected our session. Discard this response,
                // renew the session inline and retry with fresh cookies.
                let detail = response.text().await.unwrap_or_default();
                tracing::info!(
                    request_id = %log.request_id,
                    error = %detail,
                    "unauthorized, logging in again"
                );
                return match state.session.reauthenticate(generation).await {
                    Ok(()) => Attempt::Retry(ForwardError::NeedsRelogin),
                    Err(err) => {
                        log.failed(&err);
                        Attempt::Done(
                            (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                format!("proxying failed: {}\n", err),
                            )
                                .into_response(),
                        )
                    }
                };
            }

            Attempt::Done(upstream_response(
                response,
                issue_cookie.clone(),
                log.clone(),
            ))
        })
        .await
}
