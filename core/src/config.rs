//! Client configuration and base URL resolution.
//!
//! The base URL comes from, in order: the bundled runtime config
//! (`extra.apiBaseUrl`), the `API_BASE_URL` environment variable, and finally
//! the local development default.

use std::time::Duration;

use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const BASE_URL_ENV: &str = "API_BASE_URL";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve against the real process environment.
    pub fn resolve(bundled: Option<&Value>) -> Self {
        Self::resolve_with(bundled, |key| std::env::var(key).ok())
    }

    /// Resolve with an injected variable lookup.
    pub fn resolve_with(bundled: Option<&Value>, env: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = bundled
            .and_then(bundled_base_url)
            .or_else(|| env(BASE_URL_ENV).filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        tracing::debug!(%base_url, "resolved API base URL");
        Self::new(base_url.trim())
    }
}

/// `extra.apiBaseUrl`, also accepted under an `expo` wrapper as bundled by
/// app manifests.
fn bundled_base_url(config: &Value) -> Option<String> {
    ["/extra/apiBaseUrl", "/expo/extra/apiBaseUrl"]
        .iter()
        .find_map(|pointer| config.pointer(pointer).and_then(Value::as_str))
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
}
