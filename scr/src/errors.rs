//! Error types for scr.
//!
//! Configuration problems are fatal and surface before any document is
//! fetched. Fetch, format and match failures are scoped to a single
//! document or match and are normally downgraded to skip-and-continue by
//! the traversal controller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for scr operations.
#[derive(Debug, Error)]
pub enum ScrError {
    /// Invalid options, chain-specs, patterns, queries or formats.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A document or content reference could not be retrieved.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// A format template referenced an unavailable placeholder.
    #[error("{0}")]
    Format(#[from] FormatError),

    /// A structural query or script failed against a document.
    #[error("{0}")]
    Match(#[from] MatchError),

    /// The user terminated the run from an interactive prompt.
    #[error("aborted: {0}")]
    InteractionAbort(String),

    /// Writing a finalized content failed.
    #[error("output error: {0}")]
    Output(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrError {
    /// Returns true if this error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InteractionAbort(_))
    }

    /// Short machine-readable name of the error category.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Fetch(_) => "fetch",
            Self::Format(_) => "format",
            Self::Match(_) => "match",
            Self::InteractionAbort(_) => "abort",
            Self::Output(_) => "output",
            Self::Io(_) => "io",
        }
    }
}

/// Error raised while parsing options or building chains.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", self.render())]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The raw argument that configured the offending option, if known.
    pub argument: Option<String>,
    /// The chain the error refers to, if any.
    pub chain: Option<usize>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            argument: None,
            chain: None,
        }
    }

    /// Attaches the configuring argument.
    #[must_use]
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    /// Attaches the chain id.
    #[must_use]
    pub const fn with_chain(mut self, chain: usize) -> Self {
        self.chain = Some(chain);
        self
    }

    fn render(&self) -> String {
        let mut msg = String::new();
        if let Some(chain) = self.chain {
            msg.push_str(&format!("chain {chain}: "));
        }
        msg.push_str(&self.message);
        if let Some(ref arg) = self.argument {
            msg.push_str(" in ");
            msg.push_str(arg);
        }
        msg
    }
}

/// Classification of fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The request did not complete in time.
    Timeout,
    /// The file or resource does not exist.
    NotFound,
    /// The location could not be interpreted.
    InvalidLocation,
    /// No connection could be established.
    Connection,
    /// The server answered with an error status.
    Status(u16),
    /// Any other transport-level failure.
    Transport,
    /// A local IO failure other than a missing file.
    Io,
}

impl FetchErrorKind {
    /// Default human readable description of the kind.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::Timeout => "connection timeout".to_string(),
            Self::NotFound => "no such file or directory".to_string(),
            Self::InvalidLocation => "invalid url".to_string(),
            Self::Connection => "connection failed".to_string(),
            Self::Status(code) => format!("http status {code}"),
            Self::Transport => "transport error".to_string(),
            Self::Io => "io error".to_string(),
        }
    }
}

/// Error raised when a document or content link cannot be fetched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to fetch {location}: {message}")]
pub struct FetchError {
    /// What went wrong.
    pub kind: FetchErrorKind,
    /// The resolved location that was requested.
    pub location: String,
    /// Detail message.
    pub message: String,
}

impl FetchError {
    /// Creates a fetch error with the kind's default message.
    #[must_use]
    pub fn new(kind: FetchErrorKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            message: kind.describe(),
        }
    }

    /// Replaces the detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Shorthand for a timeout.
    #[must_use]
    pub fn timeout(location: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, location)
    }

    /// Shorthand for a missing resource.
    #[must_use]
    pub fn not_found(location: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, location)
    }

    /// Shorthand for a generic transport failure.
    #[must_use]
    pub fn transport(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, location).with_message(message)
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "kind".to_string(),
            serde_json::to_value(self.kind).unwrap_or(serde_json::Value::Null),
        );
        map.insert(
            "location".to_string(),
            serde_json::Value::String(self.location.clone()),
        );
        map.insert(
            "message".to_string(),
            serde_json::Value::String(self.message.clone()),
        );
        map
    }
}

/// Error raised when a template names a key missing from the scope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unavailable key '{{{placeholder}}}' in format \"{template}\"")]
pub struct FormatError {
    /// The first unresolved placeholder.
    pub placeholder: String,
    /// The template being rendered.
    pub template: String,
}

impl FormatError {
    /// Creates a new format error.
    #[must_use]
    pub fn new(placeholder: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            template: template.into(),
        }
    }
}

/// Error raised when a stage cannot be evaluated against a document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct MatchError {
    /// Detail message.
    pub message: String,
    /// The document location.
    pub location: String,
}

impl MatchError {
    /// Creates a new match error.
    #[must_use]
    pub fn new(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: location.into(),
        }
    }
}

/// Convenience result alias.
pub type Result<T, E = ScrError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::new("invalid regex").with_argument("cr=(");
        assert_eq!(err.to_string(), "invalid regex in cr=(");

        let err = ConfigurationError::new("cannot specify lic without lx or lr").with_chain(2);
        assert_eq!(err.to_string(), "chain 2: cannot specify lic without lx or lr");
    }

    #[test]
    fn test_fetch_error_display_uses_kind_message() {
        let err = FetchError::not_found("res/missing.html");
        assert_eq!(
            err.to_string(),
            "Failed to fetch res/missing.html: no such file or directory"
        );
        assert_eq!(err.kind, FetchErrorKind::NotFound);
    }

    #[test]
    fn test_fetch_error_to_dict() {
        let err = FetchError::new(FetchErrorKind::Status(404), "https://example.com/x");
        let dict = err.to_dict();
        assert_eq!(dict.get("location"), Some(&serde_json::json!("https://example.com/x")));
        assert_eq!(dict.get("message"), Some(&serde_json::json!("http status 404")));
        assert_eq!(dict.get("kind"), Some(&serde_json::json!({"status": 404})));
    }

    #[test]
    fn test_format_error_names_placeholder() {
        let err = FormatError::new("cm", "{cm}\\n");
        assert!(err.to_string().contains("'{cm}'"));
    }

    #[test]
    fn test_error_categories() {
        let err: ScrError = ConfigurationError::new("x").into();
        assert!(err.is_fatal());
        assert_eq!(err.category(), "configuration");

        let err: ScrError = FetchError::timeout("https://a").into();
        assert!(!err.is_fatal());
        assert_eq!(err.category(), "fetch");

        assert!(ScrError::InteractionAbort("user".into()).is_fatal());
    }
}
