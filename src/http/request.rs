//! Outbound request preparation.
//!
//! # Responsibilities
//! - Rewrite the request target to the backend's scheme/host/port
//! - Prepare the outbound header set from the inbound one
//! - Stay a pure function of the inbound request, so every retry attempt
//!   forwards identical bytes

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use url::Url;

/// Hop-by-hop headers, meaningful only per connection (RFC 7230 §6.1).
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Rewrite the target to the backend.
///
/// Scheme, host and port come from the base URL; path and query stay the
/// client's. A path component on the base URL is intentionally not
/// prepended.
pub fn rewrite_target(base: &Url, uri: &Uri) -> Url {
    let mut target = base.clone();
    target.set_path(uri.path());
    target.set_query(uri.query());
    target
}

/// Prepare the outbound headers for one forwarded request.
///
/// Everything is copied verbatim (repeated headers stay repeated) except:
/// - hop-by-hop headers, which belong to the client connection
/// - `Host`, rewritten by the transport from the target URL
/// - `Content-Length`, recomputed from the replayed body
/// - `Cookie`, because the shared session jar must own the outbound cookie
///   header; forwarding the client's would shadow the backend session
pub fn forward_headers(inbound: &HeaderMap, request_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if is_skipped(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert("x-request-id", value);
    }

    headers
}

fn is_skipped(name: &HeaderName) -> bool {
    if HOP_BY_HOP.contains(&name.as_str()) {
        return true;
    }
    *name == header::HOST || *name == header::CONTENT_LENGTH || *name == header::COOKIE
}
