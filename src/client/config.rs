//! Client configuration.

use std::time::Duration;

use crate::config::{ModelCatalog, OperationKind};

/// Default base URL of a local inference server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default per-request timeout for single-shot calls, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default idle timeout of a streaming response, in seconds.
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 600;

/// Default number of retry attempts after the first one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base delay in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Configuration for [`OllamaClient`](super::OllamaClient) and
/// [`BlockingOllamaClient`](super::BlockingOllamaClient).
///
/// Fixed at client construction; clients never mutate it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Timeout for one attempt of a single-shot request.
    pub timeout: Duration,
    /// Longest silence tolerated between reads of a streaming response.
    /// Active streams may run for any length of time.
    pub stream_timeout: Duration,
    /// Retry attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub backoff_base: Duration,
    /// Whether ModelNotFound/Server errors trigger a model substitution.
    pub fallback_enabled: bool,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
    pub user_agent: String,
    pub catalog: ModelCatalog,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            stream_timeout: Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            fallback_enabled: true,
            use_system_proxy: false,
            user_agent: format!("ollama-forge/{}", env!("CARGO_PKG_VERSION")),
            catalog: ModelCatalog::default(),
        }
    }
}

impl ClientConfig {
    /// Set the server base URL. A trailing `/` is dropped.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Enable or disable model fallback.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Pin the substitute model used when `model` fails for `kind`.
    pub fn with_fallback_override(
        mut self,
        model: impl Into<String>,
        kind: OperationKind,
        substitute: impl Into<String>,
    ) -> Self {
        self.catalog = self.catalog.with_fallback(model, kind, substitute);
        self
    }

    /// Register an extra model alias.
    pub fn with_alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.catalog = self.catalog.with_alias(alias, model);
        self
    }

    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.use_system_proxy = enabled;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Full URL for an API path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Total deadline for one attempt of a request.
    ///
    /// Streaming requests have none unless the request sets one; they are
    /// bounded by `stream_timeout` between reads instead.
    pub fn attempt_timeout(
        &self,
        wants_stream: bool,
        requested: Option<Duration>,
    ) -> Option<Duration> {
        match requested {
            Some(timeout) => Some(timeout),
            None if wants_stream => None,
            None => Some(self.timeout),
        }
    }

    /// Timeout quoted in the error of an exhausted attempt.
    pub(crate) fn reported_timeout(&self, deadline: Option<Duration>) -> Duration {
        deadline.unwrap_or(self.stream_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_millis(500));
        assert!(config.fallback_enabled);
    }

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let config = ClientConfig::default().with_base_url("http://gpu-box:11434/");
        assert_eq!(config.url_for("/api/tags"), "http://gpu-box:11434/api/tags");
    }

    #[test]
    fn test_attempt_timeout() {
        let config = ClientConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_stream_timeout(Duration::from_secs(50));
        assert_eq!(config.attempt_timeout(false, None), Some(Duration::from_secs(5)));
        assert_eq!(config.attempt_timeout(true, None), None);
        assert_eq!(
            config.attempt_timeout(true, Some(Duration::from_secs(1))),
            Some(Duration::from_secs(1))
        );
        assert_eq!(config.reported_timeout(None), Duration::from_secs(50));
    }
}
