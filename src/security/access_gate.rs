//! Shared-secret token gate.
//!
//! Clients prove they may use the proxy by presenting the configured secret,
//! either as a `?token=xyz` query parameter or via a long-lived cookie the
//! proxy issues on first use. With no secret configured the gate always
//! allows.

use axum::http::{header, HeaderMap, HeaderValue, Uri};

/// Name of the long-lived cookie carrying the access token.
pub const AUTH_COOKIE: &str = "grafana-proxy-auth";

/// Lifetime of the auth cookie: one year.
const AUTH_COOKIE_MAX_AGE_SECS: u64 = 31_536_000;

/// Gate verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request. When the token arrived via the query string,
    /// `issue_cookie` carries its value so the response can set the
    /// long-lived cookie and later navigations may omit the parameter.
    Allow { issue_cookie: Option<String> },

    /// Terminal rejection: respond 403, send nothing upstream, do not retry.
    Deny,
}

/// Evaluates the optional access secret against each inbound request.
#[derive(Clone)]
pub struct AccessGate {
    secret: Option<String>,
}

impl AccessGate {
    /// An empty or absent secret disables the gate.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Decide whether this request may pass.
    ///
    /// The cookie value overrides the query parameter when both are present.
    pub fn check(&self, uri: &Uri, headers: &HeaderMap) -> Decision {
        let query_token = query_param(uri, "token");
        let cookie_token = cookie_value(headers, AUTH_COOKIE);

        if let Some(secret) = &self.secret {
            let candidate = cookie_token.as_deref().or(query_token.as_deref());
            if candidate != Some(secret.as_str()) {
                return Decision::Deny;
            }
        }

        Decision::Allow {
            issue_cookie: query_token.filter(|token| !token.is_empty()),
        }
    }
}

/// Build the `Set-Cookie` value for the long-lived auth cookie.
///
/// Returns `None` for token values that cannot appear in a header.
pub fn auth_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; Max-Age={}",
        AUTH_COOKIE, token, AUTH_COOKIE_MAX_AGE_SECS
    ))
    .ok()
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// First match wins across possibly repeated `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(header::COOKIE) {
        let raw = header.to_str().ok()?;
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}
