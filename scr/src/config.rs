//! Global run settings.

use crate::engine::QueryLanguage;
use crate::fetch::config::{default_user_agent, random_user_agent};
use crate::fetch::FetchConfig;
use crate::observability::Verbosity;
use crate::traversal::TraversalOrder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings that apply to the whole run rather than to a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Visit documents breadth first.
    #[serde(default)]
    pub bfs: bool,
    /// Maximum concurrent fetches; 0 fetches inline.
    #[serde(default)]
    pub max_fetch_workers: usize,
    /// Fetch timeout in seconds; non-positive disables it.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent sent with HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Send a browser user agent picked at random instead.
    #[serde(default)]
    pub random_user_agent: bool,
    /// Netscape cookie jar loaded before the first request.
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
    /// Language of structural queries.
    #[serde(default)]
    pub query_language: QueryLanguage,
    /// Log verbosity.
    #[serde(default)]
    pub verbosity: Verbosity,
}

fn default_timeout() -> f64 {
    30.0
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            bfs: false,
            max_fetch_workers: 0,
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            random_user_agent: false,
            cookie_file: None,
            query_language: QueryLanguage::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl RunConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets breadth-first traversal.
    #[must_use]
    pub const fn with_bfs(mut self, bfs: bool) -> Self {
        self.bfs = bfs;
        self
    }

    /// Sets the number of fetch workers.
    #[must_use]
    pub const fn with_max_fetch_workers(mut self, workers: usize) -> Self {
        self.max_fetch_workers = workers;
        self
    }

    /// Sets the fetch timeout.
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

    /// Sets the structural query language.
    #[must_use]
    pub const fn with_query_language(mut self, language: QueryLanguage) -> Self {
        self.query_language = language;
        self
    }

    /// Sets the verbosity.
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// The traversal order.
    #[must_use]
    pub const fn order(&self) -> TraversalOrder {
        if self.bfs {
            TraversalOrder::BreadthFirst
        } else {
            TraversalOrder::DepthFirst
        }
    }

    /// The fetch settings derived from this configuration.
    ///
    /// Cookies from `cookie_file` are loaded by the caller.
    #[must_use]
    pub fn fetch_config(&self) -> FetchConfig {
        let user_agent = if self.random_user_agent {
            random_user_agent()
        } else {
            self.user_agent.clone()
        };
        FetchConfig::new()
            .with_timeout(self.timeout_seconds)
            .with_user_agent(user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert!(!config.bfs);
        assert_eq!(config.max_fetch_workers, 0);
        assert_eq!(config.order(), TraversalOrder::DepthFirst);
        assert!(config.user_agent.starts_with("scr/"));
    }

    #[test]
    fn test_serde_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"bfs": true}"#).unwrap();
        assert_eq!(config.order(), TraversalOrder::BreadthFirst);
        assert!((config.timeout_seconds - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.verbosity, Verbosity::Warn);
        assert_eq!(config.query_language, QueryLanguage::XPath);
        assert!(config.cookie_file.is_none());
    }

    #[test]
    fn test_fetch_config() {
        let fetch = RunConfig::new()
            .with_timeout(5.0)
            .with_user_agent("agent")
            .fetch_config();
        assert_eq!(fetch.user_agent, "agent");
        assert_eq!(fetch.timeout(), Some(std::time::Duration::from_secs(5)));

        let config = RunConfig {
            random_user_agent: true,
            ..RunConfig::default()
        };
        let ua = config.fetch_config().user_agent;
        assert!(crate::fetch::config::USER_AGENTS.contains(&ua.as_str()));
    }
}
