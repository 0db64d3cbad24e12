//! Resilient HTTP client for the backend data service.
//!
//! Two orthogonal wrappers around every GET: retry decides whether to call
//! again (≤ `retry_max_attempts`, exponential backoff from
//! `retry_base_delay`, transport errors and 5xx only), the circuit breaker
//! decides whether to call at all. 4xx responses are a contract failure and
//! are never retried. Each request logs `{method, path, status, elapsed_ms}`.

pub mod adapters;
mod circuit;
pub mod records;

pub use adapters::BackendAdapters;
pub use circuit::{CircuitBreaker, CircuitState};

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::settings::Settings;

/// Errors from the backend client and its adapters, by kind.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status} for {path}")]
    Status { status: u16, path: String },
    #[error("upstream auth failure ({status})")]
    Auth { status: u16 },
    #[error("upstream envelope code {code}: {message}")]
    Envelope { code: i64, message: String },
    #[error("{what} not found upstream")]
    NotFound { what: String },
    #[error("circuit open; backend calls suspended")]
    CircuitOpen,
    #[error("decode upstream payload: {0}")]
    Decode(String),
}

/// Pooled async HTTP client with bearer auth, retry, and a shared breaker.
///
/// The token is hot-rotatable without rebuilding the connection pool.
pub struct BackendClient {
    http: reqwest::Client,
    base: String,
    token: RwLock<String>,
    circuit: Arc<CircuitBreaker>,
    retry_max_attempts: u32,
    retry_base_delay: Duration,
}

impl BackendClient {
    /// Builds the client from settings. The reqwest pool is created once;
    /// per-call timeout comes from `java_backend_timeout`.
    pub fn new(settings: &Settings) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(settings.java_backend_timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let base = format!(
            "{}{}",
            settings.java_backend_base_url.trim_end_matches('/'),
            settings.java_backend_api_prefix
        );
        Ok(Self {
            http,
            base,
            token: RwLock::new(settings.java_backend_access_token.clone()),
            circuit: Arc::new(CircuitBreaker::new(
                settings.circuit_open_threshold,
                settings.circuit_reset,
            )),
            retry_max_attempts: settings.retry_max_attempts.max(1),
            retry_base_delay: settings.retry_base_delay,
        })
    }

    /// Swaps the bearer token without touching the pool.
    pub fn rotate_token(&self, token: impl Into<String>) {
        if let Ok(mut t) = self.token.write() {
            *t = token.into();
        }
    }

    /// The shared breaker (tests and diagnostics).
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    fn bearer(&self) -> String {
        self.token.read().map(|t| t.clone()).unwrap_or_default()
    }

    /// GET `path` (joined onto the configured base) and parse the body as
    /// JSON. Retries transport errors and 5xx; the breaker gates each attempt.
    pub async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base, path);
        let mut last_err = BackendError::Transport("no attempt made".into());

        for attempt in 1..=self.retry_max_attempts {
            if !self.circuit.allow() {
                return Err(BackendError::CircuitOpen);
            }
            let started = Instant::now();
            let result = self
                .http
                .get(&url)
                .bearer_auth(self.bearer())
                .send()
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    info!(method = "GET", path, status = status.as_u16(), elapsed_ms, "backend request");
                    if status.is_success() {
                        self.circuit.record_success();
                        return resp
                            .json::<Value>()
                            .await
                            .map_err(|e| BackendError::Decode(e.to_string()));
                    }
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        // Contract failure, not backend ill health.
                        self.circuit.record_success();
                        return Err(BackendError::Auth {
                            status: status.as_u16(),
                        });
                    }
                    if status.is_client_error() {
                        self.circuit.record_success();
                        if status.as_u16() == 404 {
                            return Err(BackendError::NotFound {
                                what: path.to_string(),
                            });
                        }
                        return Err(BackendError::Status {
                            status: status.as_u16(),
                            path: path.to_string(),
                        });
                    }
                    // 5xx: backend ill health, retried.
                    self.circuit.record_failure();
                    last_err = BackendError::Status {
                        status: status.as_u16(),
                        path: path.to_string(),
                    };
                }
                Err(e) => {
                    info!(method = "GET", path, status = 0u16, elapsed_ms, "backend request failed");
                    self.circuit.record_failure();
                    last_err = BackendError::Transport(e.to_string());
                }
            }

            if attempt < self.retry_max_attempts {
                let backoff = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                warn!(path, attempt, backoff_ms = backoff.as_millis() as u64, "retrying backend request");
                tokio::time::sleep(backoff).await;
            }
        }
        Err(last_err)
    }
}
