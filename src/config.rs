//! Client configuration

use std::collections::HashMap;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::error::{ApiError, Result};
use crate::retry::RetryPolicy;

/// Environment variable holding the API base URL (required by [`ClientConfig::from_env`])
pub const ENV_API_URL: &str = "TRADEBOARD_API_URL";
/// Environment variable overriding the refresh endpoint path
pub const ENV_REFRESH_PATH: &str = "TRADEBOARD_REFRESH_PATH";
/// Environment variable overriding the retry budget
pub const ENV_MAX_RETRIES: &str = "TRADEBOARD_MAX_RETRIES";
/// Environment variable overriding the backoff base delay, in milliseconds
pub const ENV_RETRY_BASE_DELAY_MS: &str = "TRADEBOARD_RETRY_BASE_DELAY_MS";
/// Environment variable overriding the request timeout, in seconds
pub const ENV_TIMEOUT_SECS: &str = "TRADEBOARD_TIMEOUT_SECS";
/// Environment variable overriding the pre-emptive refresh leeway, in seconds (0 disables)
pub const ENV_REFRESH_LEEWAY_SECS: &str = "TRADEBOARD_REFRESH_LEEWAY_SECS";

fn default_headers() -> HashMap<String, String> {
    HashMap::from([
        ("content-type".to_string(), "application/json".to_string()),
        ("accept".to_string(), "application/json".to_string()),
    ])
}

/// Configuration for [`ApiClient`](crate::ApiClient)
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tradeboard_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://api.tradeboard.example/v1")
///     .max_retries(5)
///     .base_delay(Duration::from_millis(250))
///     .build();
///
/// assert_eq!(config.refresh_url(), "https://api.tradeboard.example/v1/auth/refresh");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ClientConfig"),
    builder_type(doc = "Builder for ClientConfig", vis = "pub"),
    build_method(doc = "Build the ClientConfig")
)]
pub struct ClientConfig {
    /// API base URL; relative request paths are joined onto it
    #[builder(setter(into))]
    pub base_url: String,

    /// Refresh endpoint, relative to `base_url` unless absolute
    #[builder(default = "/auth/refresh".to_string(), setter(into))]
    pub refresh_path: String,

    /// Headers sent with every request (`Content-Type` and `Accept` JSON by default)
    #[builder(default = default_headers())]
    pub default_headers: HashMap<String, String>,

    /// Retries after the first send for transient transport failures
    #[builder(default = 3)]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each attempt
    #[builder(default = Duration::from_millis(1000))]
    pub base_delay: Duration,

    /// Statuses retried, whether reported by a transport failure or a response
    #[builder(default = vec![408, 429, 500, 502, 503, 504])]
    pub retryable_statuses: Vec<u16>,

    /// Retry transport failures that carry no status
    #[builder(default = true)]
    pub retry_network_errors: bool,

    /// Refresh pre-emptively when the access token expires within this window
    ///
    /// `None` disables the pre-emptive check; 401 responses still refresh.
    #[builder(default = Some(Duration::from_secs(30)))]
    pub refresh_leeway: Option<Duration>,

    /// Per-request timeout for the HTTP transport
    #[builder(default = Some(Duration::from_secs(30)))]
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Load configuration from `TRADEBOARD_*` environment variables
    ///
    /// # Errors
    /// Returns a `Configuration` error if `TRADEBOARD_API_URL` is missing or
    /// any variable is malformed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(ENV_API_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ApiError::configuration(format!("{ENV_API_URL} is not set")))?;

        let mut config = Self::builder().base_url(base_url).build();

        if let Some(path) = lookup(ENV_REFRESH_PATH) {
            config.refresh_path = path;
        }
        if let Some(retries) = parse_var(&lookup, ENV_MAX_RETRIES)? {
            config.max_retries = retries;
        }
        if let Some(ms) = parse_var(&lookup, ENV_RETRY_BASE_DELAY_MS)? {
            config.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var(&lookup, ENV_TIMEOUT_SECS)? {
            config.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_REFRESH_LEEWAY_SECS)? {
            config.refresh_leeway = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the base URL is an absolute http(s) URL
    ///
    /// # Errors
    /// Returns a `Configuration` error describing the problem
    pub fn validate(&self) -> Result<()> {
        if !is_absolute(&self.base_url) {
            return Err(ApiError::configuration(format!(
                "base_url must be an absolute http(s) URL, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Resolve a request path against the base URL
    ///
    /// Absolute URLs pass through unchanged.
    #[must_use]
    pub fn resolve_url(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Absolute URL of the refresh endpoint
    #[must_use]
    pub fn refresh_url(&self) -> String {
        self.resolve_url(&self.refresh_path)
    }

    /// Retry policy derived from this configuration
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            retryable_statuses: self.retryable_statuses.clone(),
            retry_network_errors: self.retry_network_errors,
        }
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ApiError::configuration(format!("{key} has invalid value '{raw}'")))
        })
        .transpose()
}
