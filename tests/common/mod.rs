//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use url::Url;

use grafana_proxy::lifecycle::Shutdown;
use grafana_proxy::security::AccessGate;
use grafana_proxy::session::{Credentials, SessionManager};
use grafana_proxy::HttpServer;

pub const BACKEND_USER: &str = "admin";
pub const BACKEND_PASS: &str = "swordfish";

const SESSION_COOKIE: &str = "backend-session";

/// Handle to a running mock backend.
pub struct AuthBackend {
    pub login_calls: Arc<AtomicU32>,
    pub protected_hits: Arc<AtomicU32>,
    current_session: Arc<AtomicU32>,
}

impl AuthBackend {
    /// Invalidate every session cookie issued so far; subsequent requests
    /// get 401 until a fresh login happens.
    #[allow(dead_code)]
    pub fn expire_sessions(&self) {
        self.current_session.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct BackendState {
    login_calls: Arc<AtomicU32>,
    protected_hits: Arc<AtomicU32>,
    current_session: Arc<AtomicU32>,
}

/// Start a mock backend with a form-login endpoint and cookie-checked
/// content routes.
pub async fn start_auth_backend(addr: SocketAddr) -> AuthBackend {
    let state = BackendState {
        login_calls: Arc::new(AtomicU32::new(0)),
        protected_hits: Arc::new(AtomicU32::new(0)),
        current_session: Arc::new(AtomicU32::new(0)),
    };
    let handle = AuthBackend {
        login_calls: state.login_calls.clone(),
        protected_hits: state.protected_hits.clone(),
        current_session: state.current_session.clone(),
    };

    let router = Router::new()
        .route("/login", post(login))
        .fallback(protected)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    handle
}

async fn login(State(state): State<BackendState>, body: String) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);

    let mut user = None;
    let mut password = None;
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "user" => user = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            _ => {}
        }
    }

    if user.as_deref() == Some(BACKEND_USER) && password.as_deref() == Some(BACKEND_PASS) {
        let session = state.current_session.load(Ordering::SeqCst);
        let cookie = format!("{}={}; Path=/", SESSION_COOKIE, session);
        ([(header::SET_COOKIE, cookie)], "logged in").into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "bad credentials").into_response()
    }
}

async fn protected(State(state): State<BackendState>, request: Request<Body>) -> Response {
    let current = state.current_session.load(Ordering::SeqCst).to_string();
    if session_cookie(request.headers()).as_deref() != Some(current.as_str()) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    state.protected_hits.fetch_add(1, Ordering::SeqCst);

    match request.uri().path() {
        "/empty" => (StatusCode::OK, "").into_response(),
        "/blob" => (StatusCode::OK, blob_body()).into_response(),
        "/headers" => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            headers.append("x-test", HeaderValue::from_static("a"));
            headers.append("x-test", HeaderValue::from_static("b"));
            (StatusCode::OK, headers, "{}").into_response()
        }
        "/echo" => {
            let method = request.method().as_str().to_string();
            let query = request.uri().query().unwrap_or("").to_string();
            let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
                .await
                .unwrap();
            (
                [
                    ("x-echo-method", method),
                    ("x-echo-query", query),
                ],
                body,
            )
                .into_response()
        }
        _ => (StatusCode::OK, "hello from the backend").into_response(),
    }
}

/// Deterministic 2 MiB payload for streaming tests.
pub fn blob_body() -> Vec<u8> {
    (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect()
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let raw = value.to_str().ok()?;
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == SESSION_COOKIE {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Build a proxy against `backend`, perform the initial login, and serve it
/// on `proxy_addr`. Returns the shutdown handle.
pub async fn spawn_proxy(
    proxy_addr: SocketAddr,
    backend: &str,
    token: Option<&str>,
) -> Shutdown {
    let base = Url::parse(backend).unwrap();
    let shutdown = Shutdown::new();

    let credentials = Credentials {
        user: BACKEND_USER.into(),
        pass: BACKEND_PASS.into(),
    };
    let session = Arc::new(SessionManager::new(&base, credentials, shutdown.clone()).unwrap());
    session.authenticate().await.unwrap();

    let gate = AccessGate::new(token.map(str::to_string));
    let listener = tokio::net::TcpListener::bind(proxy_addr).await.unwrap();
    let server = HttpServer::new(base, session, gate);

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown
}

/// A client that talks straight to the given address, no env proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
