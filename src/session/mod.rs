//! Backend session ownership.
//!
//! # Data Flow
//! ```text
//! startup:
//!     authenticate() → POST {baseurl}/login (form: user, password)
//!     → Set-Cookie captured by the shared cookie jar
//!     → listener opens
//!
//! on 401 from the backend:
//!     forwarding pipeline → reauthenticate(observed generation)
//!     → single-flight re-login, jar replaced cookies
//!     → pipeline retries the dispatch
//! ```
//!
//! # Design Decisions
//! - Exactly one transport process-wide; every request pipeline borrows it,
//!   only login responses mutate the cookie state
//! - Login success is inferred from any HTTP response; only transport errors
//!   retry (credential rejection is a backend policy the proxy cannot fix)
//! - Concurrent 401s collapse into one login via a generation counter: a
//!   caller that observed a stale generation finds the session already
//!   renewed and skips the login entirely

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::lifecycle::Shutdown;
use crate::resilience::{Attempt, BackoffPolicy, RetryError};

/// Login credentials for the backend, fixed at startup.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

/// Errors surfaced by the session manager.
///
/// Transport failures during login are absent on purpose: they are retried
/// until they stop happening.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("cannot derive login URL from base URL: {0}")]
    LoginUrl(#[from] url::ParseError),

    #[error("shutdown before login completed")]
    ShuttingDown,
}

/// Owns the backend session: the cookie-carrying transport, the login call,
/// and the re-authentication discipline.
pub struct SessionManager {
    client: reqwest::Client,
    login_url: Url,
    credentials: Credentials,
    policy: BackoffPolicy,
    login_lock: Mutex<()>,
    generation: AtomicU64,
    shutdown: Shutdown,
}

impl SessionManager {
    pub fn new(
        base: &Url,
        credentials: Credentials,
        shutdown: Shutdown,
    ) -> Result<Self, SessionError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let login_url = Url::parse(&format!("{}/login", base.as_str().trim_end_matches('/')))?;

        Ok(Self {
            client,
            login_url,
            credentials,
            policy: BackoffPolicy::unbounded(),
            login_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            shutdown,
        })
    }

    /// The shared transport. Session cookies from the jar are attached to
    /// every request sent through it.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Current session generation. Bumps after every successful login.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Log in to the backend, retrying until it succeeds.
    ///
    /// Blocks the caller for as long as that takes; the only early exit is a
    /// shutdown signal.
    pub async fn authenticate(&self) -> Result<(), SessionError> {
        self.reauthenticate(self.generation()).await
    }

    /// Single-flight re-login.
    ///
    /// `observed` is the generation the caller saw when its request came
    /// back 401. If the session has moved past it, another caller already
    /// renewed the session and there is nothing to do.
    pub async fn reauthenticate(&self, observed: u64) -> Result<(), SessionError> {
        let _guard = self.login_lock.lock().await;
        if self.generation.load(Ordering::Acquire) != observed {
            return Ok(());
        }

        self.login().await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn login(&self) -> Result<(), SessionError> {
        let client = &self.client;
        let login_url = &self.login_url;
        let credentials = &self.credentials;

        let mut shutdown_rx = self.shutdown.subscribe();
        let outcome = self
            .policy
            .run_until_shutdown(&mut shutdown_rx, move |attempt| async move {
                let form = [
                    ("user", credentials.user.as_str()),
                    ("password", credentials.pass.as_str()),
                ];
                match client.post(login_url.clone()).form(&form).send().await {
                    Ok(_response) => Attempt::Done(()),
                    Err(err) => {
                        tracing::error!(
                            user = %credentials.user,
                            attempt = attempt,
                            error = %err,
                            "login failed"
                        );
                        Attempt::Retry(err)
                    }
                }
            })
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(user = %self.credentials.user, "backend login succeeded");
                Ok(())
            }
            // The unbounded policy has no budget to exhaust; keep the error
            // honest anyway.
            Err(RetryError::Exhausted(err)) => Err(SessionError::Client(err)),
            Err(_) => Err(SessionError::ShuttingDown),
        }
    }
}
