//! Response assembly.
//!
//! # Responsibilities
//! - Copy upstream status and headers to the client verbatim
//! - Attach the gate's long-lived auth cookie when one is due
//! - Stream the upstream body without buffering, counting bytes
//! - Emit the per-request completion record exactly once

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use futures_util::Stream;
use uuid::Uuid;

use crate::security::access_gate;

/// Log context for one inbound request.
///
/// One terminal record is emitted per request — denied, failed or completed —
/// never one per retry attempt.
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub query: String,
    pub host: String,
    pub user_agent: String,
    pub remote_addr: String,
}

impl RequestLog {
    pub fn new(request_id: Uuid, method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let header_str = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_string()
        };

        Self {
            request_id,
            method: method.clone(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or("").to_string(),
            host: header_str(header::HOST),
            user_agent: header_str(header::USER_AGENT),
            remote_addr: header_str(HeaderName::from_static("x-forwarded-for")),
        }
    }

    /// Terminal record for a request the access gate rejected.
    pub fn denied(&self) {
        tracing::error!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            query = %self.query,
            host = %self.host,
            user_agent = %self.user_agent,
            remote_addr = %self.remote_addr,
            status = StatusCode::FORBIDDEN.as_u16(),
            "access token missing or wrong"
        );
    }

    /// Terminal record for a request whose retry budget ran out.
    pub fn failed(&self, error: &dyn std::fmt::Display) {
        tracing::error!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            query = %self.query,
            host = %self.host,
            user_agent = %self.user_agent,
            remote_addr = %self.remote_addr,
            status = StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            error = %error,
            "backend request failed"
        );
    }

    /// Terminal record for a streamed upstream response.
    fn completed(&self, status: StatusCode, bytes_sent: u64) {
        tracing::info!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            query = %self.query,
            host = %self.host,
            user_agent = %self.user_agent,
            remote_addr = %self.remote_addr,
            status = status.as_u16(),
            bytes_sent = bytes_sent,
            "request completed"
        );
    }
}

/// Build the client response for a terminal upstream reply.
///
/// Status and headers are copied verbatim — repeated headers stay repeated,
/// in upstream order. The outgoing response starts with no `Content-Type` of
/// its own, so the final value, if any, comes solely from upstream.
pub fn upstream_response(
    upstream: reqwest::Response,
    issue_cookie: Option<String>,
    log: RequestLog,
) -> Response {
    let status = upstream.status();

    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if is_connection_level(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(token) = issue_cookie {
        match access_gate::auth_cookie(&token) {
            Some(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            None => tracing::warn!(
                request_id = %log.request_id,
                "token value not representable in a Set-Cookie header"
            ),
        }
    }

    let body = Body::from_stream(CountedBody::new(upstream, status, log));

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Headers the server re-derives for its own connection to the client.
fn is_connection_level(name: &HeaderName) -> bool {
    *name == header::TRANSFER_ENCODING
        || *name == header::CONNECTION
        || name.as_str() == "keep-alive"
}

/// Byte-counting wrapper around the upstream body stream.
///
/// The completion record fires when the stream is dropped, whether the body
/// ran to completion or the client went away first.
struct CountedBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    status: StatusCode,
    bytes_sent: u64,
    log: Option<RequestLog>,
}

impl CountedBody {
    fn new(upstream: reqwest::Response, status: StatusCode, log: RequestLog) -> Self {
        Self {
            inner: Box::pin(upstream.bytes_stream()),
            status,
            bytes_sent: 0,
            log: Some(log),
        }
    }
}

impl Stream for CountedBody {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            self.bytes_sent += chunk.len() as u64;
        }
        polled
    }
}

impl Drop for CountedBody {
    fn drop(&mut self) {
        if let Some(log) = self.log.take() {
            log.completed(self.status, self.bytes_sent);
        }
    }
}
