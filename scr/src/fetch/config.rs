//! Fetch configuration.

use super::cookies::CookieEntry;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for document and content link fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_size")]
    pub max_response_size: usize,
    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Cookies sent with matching requests.
    #[serde(default)]
    pub cookies: Vec<CookieEntry>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_max_redirects() -> usize {
    10
}

/// The user agent sent unless configured otherwise.
#[must_use]
pub fn default_user_agent() -> String {
    format!("scr/{}", env!("CARGO_PKG_VERSION"))
}

/// Browser user agents picked from by [`random_user_agent`].
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Picks one of [`USER_AGENTS`] at random.
#[must_use]
pub fn random_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .map_or_else(default_user_agent, |ua| (*ua).to_string())
}

fn default_max_size() -> usize {
    256 * 1024 * 1024
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_response_size: default_max_size(),
            headers: HashMap::new(),
            cookies: Vec::new(),
        }
    }
}

impl FetchConfig {
    /// Creates a new fetch configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the cookies.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<CookieEntry>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Gets the timeout as a `Duration`. Non-positive values disable it.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0.0 && self.timeout_seconds.is_finite())
            .then(|| Duration::from_secs_f64(self.timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout_seconds, 30.0);
        assert_eq!(config.max_redirects, 10);
        assert!(config.user_agent.starts_with("scr/"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_fetch_config_builder() {
        let config = FetchConfig::new()
            .with_timeout(0.0)
            .with_user_agent("custom-agent")
            .with_header("Accept-Language", "en");

        assert_eq!(config.timeout(), None);
        assert_eq!(config.user_agent, "custom-agent");
        assert_eq!(config.headers.get("Accept-Language"), Some(&"en".to_string()));
    }

    #[test]
    fn test_random_user_agent() {
        for _ in 0..8 {
            assert!(USER_AGENTS.contains(&random_user_agent().as_str()));
        }
    }

    #[test]
    fn test_fetch_config_deserializes_partial() {
        let config: FetchConfig = serde_json::from_str(r#"{"timeout_seconds": 5}"#).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.max_redirects, 10);
    }
}
