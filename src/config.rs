//! Client configuration.
//!
//! Every component takes its own config section so it can be built and
//! tested alone. [`ClientConfig`] groups them for the [`crate::BankClient`]
//! facade.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.pocketbank.app/v1";
pub const DEFAULT_WS_URL: &str = "wss://rt.pocketbank.app/ws";

pub const ENV_API_URL: &str = "POCKETBANK_API_URL";
pub const ENV_WS_URL: &str = "POCKETBANK_WS_URL";
pub const ENV_STORAGE_DIR: &str = "POCKETBANK_STORAGE_DIR";
pub const ENV_CLIENT_VERSION: &str = "POCKETBANK_CLIENT_VERSION";

/// Request dispatch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Sent as `X-Client-Version`
    pub client_version: String,
    pub request_timeout: Duration,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout: Duration::from_secs(30),
            login_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_path: "/auth/logout".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Join the base URL and a request path.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Realtime channel settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub url: String,
    /// Reconnect attempts before giving up (default: 5)
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt (default: 1s)
    pub base_delay: Duration,
    /// Upper bound for the reconnect delay (default: 30s)
    pub max_delay: Duration,
    /// Time allowed for the server to accept the handshake (default: 10s)
    pub auth_timeout: Duration,
    /// Ping interval; `None` disables the heartbeat (default: 25s)
    pub heartbeat_interval: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            heartbeat_interval: Some(Duration::from_secs(25)),
        }
    }
}

impl ChannelConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(base * 2^(attempt - 1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Resource cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// How long an entry without subscribers is kept (default: 60s)
    pub keep_unused_for: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            keep_unused_for: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn with_keep_unused_for(mut self, keep: Duration) -> Self {
        self.keep_unused_for = keep;
        self
    }
}

/// Complete client configuration.
///
/// # Example
///
/// ```ignore
/// use pocketbank::config::ClientConfig;
///
/// let config = ClientConfig::from_env()
///     .with_api_url("http://localhost:8080")
///     .with_storage_dir("/tmp/pocketbank");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub cache: CacheConfig,
    /// Secure storage directory; `None` uses `~/.pocketbank`
    pub storage_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.channel.url = url.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Defaults overridden by `POCKETBANK_*` environment variables.
    /// Empty values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_value(ENV_API_URL) {
            config.api.base_url = url;
        }
        if let Some(url) = env_value(ENV_WS_URL) {
            config.channel.url = url;
        }
        if let Some(dir) = env_value(ENV_STORAGE_DIR) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(version) = env_value(ENV_CLIENT_VERSION) {
            config.api.client_version = version;
        }
        config
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api.request_timeout, Duration::from_secs(30));
        assert_eq!(config.api.refresh_path, "/auth/refresh");
        assert_eq!(config.api.client_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.channel.max_attempts, 5);
        assert_eq!(config.channel.auth_timeout, Duration::from_secs(10));
        assert_eq!(
            config.channel.heartbeat_interval,
            Some(Duration::from_secs(25))
        );
        assert_eq!(config.cache.keep_unused_for, Duration::from_secs(60));
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn test_url_for_joins_slashes() {
        let api = ApiConfig::default().with_base_url("http://localhost:8080/");
        assert_eq!(api.url_for("/accounts"), "http://localhost:8080/accounts");
        assert_eq!(api.url_for("accounts"), "http://localhost:8080/accounts");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let channel = ChannelConfig::default();
        assert_eq!(channel.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(channel.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(channel.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(channel.backoff_delay(5), Duration::from_secs(16));
        assert_eq!(channel.backoff_delay(6), Duration::from_secs(30));
        assert_eq!(channel.backoff_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::new()
            .with_api_url("http://api")
            .with_ws_url("ws://rt")
            .with_storage_dir("/tmp/pb")
            .with_cache(CacheConfig::default().with_keep_unused_for(Duration::ZERO));
        assert_eq!(config.api.base_url, "http://api");
        assert_eq!(config.channel.url, "ws://rt");
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/pb")));
        assert_eq!(config.cache.keep_unused_for, Duration::ZERO);
    }
}
