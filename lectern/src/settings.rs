//! Typed runtime settings, read once from the process environment at startup.
//!
//! The `config` crate has already layered `.env` and the XDG config file into
//! the environment by the time [`Settings::from_env`] runs. `USE_MOCK_DATA`
//! is the one hot-togglable flag (tests and operators flip it at runtime).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Runtime settings for the whole service. Shared as `Arc<Settings>`.
#[derive(Debug)]
pub struct Settings {
    /// Upstream base URL, e.g. `http://backend:8080`.
    pub java_backend_base_url: String,
    /// Path prefix joined onto the base URL, e.g. `/dify`.
    pub java_backend_api_prefix: String,
    /// Bearer token for outbound calls (hot-rotatable on the client).
    pub java_backend_access_token: String,
    /// Per outbound call timeout.
    pub java_backend_timeout: Duration,
    use_mock_data: AtomicBool,
    /// Confidence ladder: at or above this the intent is kept as-is.
    pub router_confidence_high: f64,
    /// Confidence ladder: below this actionable intents fall to smalltalk.
    pub router_confidence_low: f64,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub circuit_open_threshold: u32,
    pub circuit_reset: Duration,
    pub session_ttl: Duration,
    pub tool_timeout: Duration,
    /// Chat model for all LLM agents (router, planner, chat, compose).
    pub model: String,
    /// When set, the router also advertises quiz/content-generation intents.
    pub enable_content_intents: bool,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl Settings {
    /// Reads settings from the environment, applying the documented defaults.
    pub fn from_env() -> Self {
        Self {
            java_backend_base_url: env_string("JAVA_BACKEND_BASE_URL", "http://localhost:8080"),
            java_backend_api_prefix: env_string("JAVA_BACKEND_API_PREFIX", "/dify"),
            java_backend_access_token: env_string("JAVA_BACKEND_ACCESS_TOKEN", ""),
            java_backend_timeout: Duration::from_secs(env_parse("JAVA_BACKEND_TIMEOUT_SEC", 15u64)),
            use_mock_data: AtomicBool::new(env_flag("USE_MOCK_DATA")),
            router_confidence_high: env_parse("ROUTER_CONFIDENCE_HIGH", 0.7f64),
            router_confidence_low: env_parse("ROUTER_CONFIDENCE_LOW", 0.4f64),
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3u32),
            retry_base_delay: Duration::from_millis(env_parse("RETRY_BASE_DELAY_MS", 500u64)),
            circuit_open_threshold: env_parse("CIRCUIT_OPEN_THRESHOLD", 5u32),
            circuit_reset: Duration::from_secs(env_parse("CIRCUIT_RESET_SEC", 60u64)),
            session_ttl: Duration::from_secs(env_parse("SESSION_TTL_SEC", 3600u64)),
            tool_timeout: Duration::from_secs(env_parse("TOOL_TIMEOUT_SEC", 15u64)),
            model: env_string("LECTERN_MODEL", "gpt-4o-mini"),
            enable_content_intents: env_flag("ENABLE_CONTENT_INTENTS"),
        }
    }

    /// Current value of the mock-data flag.
    pub fn use_mock_data(&self) -> bool {
        self.use_mock_data.load(Ordering::Relaxed)
    }

    /// Hot-toggles mock mode for all data tools.
    pub fn set_use_mock_data(&self, on: bool) {
        self.use_mock_data.store(on, Ordering::Relaxed);
    }
}

#[cfg(test)]
impl Settings {
    /// Settings for tests: mock data on, short timers, no backend.
    pub(crate) fn for_tests() -> Self {
        Self {
            java_backend_base_url: "http://localhost:0".into(),
            java_backend_api_prefix: "/dify".into(),
            java_backend_access_token: String::new(),
            java_backend_timeout: Duration::from_millis(200),
            use_mock_data: AtomicBool::new(true),
            router_confidence_high: 0.7,
            router_confidence_low: 0.4,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            circuit_open_threshold: 5,
            circuit_reset: Duration::from_millis(50),
            session_ttl: Duration::from_secs(3600),
            tool_timeout: Duration::from_millis(500),
            model: "mock".into(),
            enable_content_intents: false,
        }
    }
}
