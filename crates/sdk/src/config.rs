use std::time::Duration;

use mobank_core::env_var_or;

/// Used when `MOBANK_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "https://api.mobank.app/v1";

pub const API_URL_ENV: &str = "MOBANK_API_URL";
pub const HTTP_TIMEOUT_ENV: &str = "MOBANK_HTTP_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens to the session when the refresh call itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// When true, a refresh call that got no response from the server signs the
    /// user out just like a rejected refresh does. When false, credentials are
    /// kept and the caller gets a network error instead.
    pub sign_out_on_network_error: bool,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self { sign_out_on_network_error: true }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub refresh_policy: RefreshPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("mobank/{}", env!("CARGO_PKG_VERSION")),
            refresh_policy: RefreshPolicy::default(),
        }
    }

    /// Builds the config from `MOBANK_API_URL` and `MOBANK_HTTP_TIMEOUT_SECS`,
    /// falling back to [`DEFAULT_API_URL`] and a 10 second timeout.
    pub fn from_env() -> Self {
        let mut config = Self::new(env_var_or(API_URL_ENV, DEFAULT_API_URL));
        if let Some(timeout) = parse_timeout(&env_var_or(HTTP_TIMEOUT_ENV, "")) {
            config.timeout = timeout;
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_refresh_policy(mut self, refresh_policy: RefreshPolicy) -> Self {
        self.refresh_policy = refresh_policy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

fn parse_timeout(raw: &str) -> Option<Duration> {
    raw.parse::<u64>().ok().filter(|secs| *secs > 0).map(Duration::from_secs)
}
