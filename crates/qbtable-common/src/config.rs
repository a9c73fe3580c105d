use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Quickbase REST API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.quickbase.com/v1";

/// Default local lifetime of a temporary token, in seconds.
///
/// The backend expires temporary tokens on its own; the local timeout is kept
/// at or below the backend's so a stale token is never sent knowingly.
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 300;

/// Errors produced while validating a [`Config`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The table identifier is empty.
    #[error("table id must not be empty")]
    MissingTableId,

    /// The realm hostname is empty.
    #[error("realm hostname must not be empty")]
    MissingRealm,

    /// The base URL could not be parsed.
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The token lifetime is zero.
    #[error("token TTL must be greater than zero")]
    ZeroTokenTtl,
}

/// Retry behaviour of the request executor.
///
/// The executor allows `max_retries` additional attempts beyond the first one,
/// shared between rate-limit backoffs and credential refreshes.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use qbtable_common::RetryConfig;
///
/// let config = RetryConfig {
///     max_retries: 2,
///     default_retry_after: Duration::from_secs(1),
///     max_retry_after: Duration::from_secs(30),
/// };
/// assert_eq!(config.max_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries permitted after the first attempt.
    pub max_retries: u32,
    /// Backoff used when a 429 response has no usable `retry-after` header.
    pub default_retry_after: Duration,
    /// Upper bound applied to any `retry-after` value sent by the backend.
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            default_retry_after: Duration::from_secs(1),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Total number of attempts, including the first one.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Clamps a backend supplied backoff to `max_retry_after`.
    #[must_use]
    pub fn clamp(&self, retry_after: Duration) -> Duration {
        retry_after.min(self.max_retry_after)
    }
}

/// Configuration for a single table client.
///
/// One `Config` describes exactly one backend table in one realm. Secrets are
/// held as [`SecretString`] and are never serialized.
///
/// # Examples
///
/// ```
/// use qbtable_common::Config;
///
/// let config = Config::new("bqx7xre7a", "example.quickbase.com")
///     .with_user_token("b7738j_xxx")
///     .with_timeout(30);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.base_url(), "https://api.quickbase.com/v1");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the table every operation targets.
    pub table_id: String,
    /// Realm hostname, sent as `QB-Realm-Hostname` on every request.
    pub realm_host: String,
    /// Optional override of the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Externally issued user token. When present the temporary-auth flow
    /// is skipped entirely.
    #[serde(skip_serializing, default)]
    pub user_token: Option<SecretString>,
    /// Application token sent with the temporary-auth request.
    #[serde(skip_serializing, default)]
    pub app_token: Option<SecretString>,
    /// Session cookie sent with the temporary-auth request.
    #[serde(skip_serializing, default)]
    pub session_cookie: Option<SecretString>,
    /// Client identifying `User-Agent` value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Local lifetime of a fetched temporary token.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// Spawn a background task that clears a fetched token when it expires.
    #[serde(default = "default_proactive_expiry")]
    pub proactive_expiry: bool,
    /// Retry behaviour of the request executor.
    #[serde(skip)]
    pub retry_config: RetryConfig,
}

fn default_user_agent() -> String {
    format!("qbtable/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

const fn default_proactive_expiry() -> bool {
    true
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &Option<SecretString>| s.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("table_id", &self.table_id)
            .field("realm_host", &self.realm_host)
            .field("base_url", &self.base_url)
            .field("user_token", &redact(&self.user_token))
            .field("app_token", &redact(&self.app_token))
            .field("session_cookie", &redact(&self.session_cookie))
            .field("user_agent", &self.user_agent)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("proactive_expiry", &self.proactive_expiry)
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

impl Config {
    /// Creates a configuration for `table_id` in the realm `realm_host`.
    ///
    /// All optional fields are initialized to their defaults.
    pub fn new(table_id: impl Into<String>, realm_host: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            realm_host: realm_host.into(),
            base_url: None,
            user_token: None,
            app_token: None,
            session_cookie: None,
            user_agent: default_user_agent(),
            timeout_seconds: None,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            proactive_expiry: true,
            retry_config: RetryConfig::default(),
        }
    }

    /// Sets a custom base URL for API requests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets an externally issued user token.
    #[must_use]
    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(SecretString::new(token.into().into()));
        self
    }

    /// Sets the application token used when requesting temporary tokens.
    #[must_use]
    pub fn with_app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = Some(SecretString::new(token.into().into()));
        self
    }

    /// Sets the session cookie used when requesting temporary tokens.
    #[must_use]
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(SecretString::new(cookie.into().into()));
        self
    }

    /// Sets the `User-Agent` header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Sets the local lifetime of fetched temporary tokens.
    #[must_use]
    pub const fn with_token_ttl(mut self, ttl_seconds: u64) -> Self {
        self.token_ttl_seconds = ttl_seconds;
        self
    }

    /// Enables or disables the background expiry task.
    #[must_use]
    pub const fn with_proactive_expiry(mut self, enabled: bool) -> Self {
        self.proactive_expiry = enabled;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub const fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Returns the effective API base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    /// Returns the local token lifetime as a [`Duration`].
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    /// Checks that the configuration can address a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table id or realm is blank, the base URL does
    /// not parse, or the token TTL is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_id.trim().is_empty() {
            return Err(ConfigError::MissingTableId);
        }
        if self.realm_host.trim().is_empty() {
            return Err(ConfigError::MissingRealm);
        }
        let base = self.base_url();
        url::Url::parse(base).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        if self.token_ttl_seconds == 0 {
            return Err(ConfigError::ZeroTokenTtl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("tbl", "realm.quickbase.com");
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.token_ttl(), Duration::from_secs(300));
        assert_eq!(config.retry_config.max_retries, 1);
        assert_eq!(config.retry_config.max_attempts(), 2);
        assert!(config.proactive_expiry);
        assert!(config.user_agent.starts_with("qbtable/"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = Config::new("tbl", "realm").with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        assert_eq!(
            Config::new(" ", "realm").validate(),
            Err(ConfigError::MissingTableId)
        );
        assert_eq!(
            Config::new("tbl", "").validate(),
            Err(ConfigError::MissingRealm)
        );
        assert_eq!(
            Config::new("tbl", "realm").with_token_ttl(0).validate(),
            Err(ConfigError::ZeroTokenTtl)
        );
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let err = Config::new("tbl", "realm")
            .with_base_url("not a url")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::new("tbl", "realm")
            .with_user_token("super-secret")
            .with_app_token("app-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("app-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = Config::new("tbl", "realm").with_user_token("super-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("user_token"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str(
            r#"
table_id = "bqx7xre7a"
realm_host = "example.quickbase.com"
user_token = "b7738j_abc"
"#,
        )
        .unwrap();
        assert_eq!(config.table_id, "bqx7xre7a");
        assert_eq!(config.token_ttl_seconds, DEFAULT_TOKEN_TTL_SECONDS);
        assert!(config.proactive_expiry);
        assert_eq!(
            config.user_token.as_ref().unwrap().expose_secret(),
            "b7738j_abc"
        );
    }

    #[test]
    fn test_retry_after_clamped() {
        let retry = RetryConfig::default();
        assert_eq!(
            retry.clamp(Duration::from_secs(600)),
            Duration::from_secs(60)
        );
        assert_eq!(retry.clamp(Duration::from_secs(2)), Duration::from_secs(2));
    }
}
