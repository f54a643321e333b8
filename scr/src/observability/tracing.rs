//! Tracing subscriber setup for the `scr` binary.
//!
//! Diagnostics go to stderr so they never mix with printed content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the verbosity filter.
pub const LOG_ENV_VAR: &str = "SCR_LOG";

/// How much is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Errors only.
    Error,
    /// Errors and skipped work.
    #[default]
    Warn,
    /// Progress of the run.
    Info,
    /// Every match and fetch.
    Debug,
}

impl Verbosity {
    /// Every level, quietest first.
    pub const ALL: [Self; 4] = [Self::Error, Self::Warn, Self::Info, Self::Debug];

    /// The level name, also used as the `v=` value.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// The default filter directive for this level.
    #[must_use]
    pub fn directive(self) -> String {
        format!("scr={}", self.name())
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn env_filter(verbosity: Verbosity) -> EnvFilter {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(verbosity.directive()))
}

/// Installs the global subscriber.
///
/// `SCR_LOG` and then `RUST_LOG` take precedence over `verbosity`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(verbosity: Verbosity, json: bool) {
    let filter = env_filter(verbosity);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
