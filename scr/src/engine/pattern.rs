//! Regular expression stage.

use crate::errors::ConfigurationError;
use regex::{Regex, RegexBuilder};

/// One match of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternMatch {
    /// The whole match.
    pub whole: String,
    /// Every capture group in order, empty if it did not participate.
    pub groups: Vec<String>,
    /// Named capture groups.
    pub named: Vec<(String, String)>,
}

impl PatternMatch {
    fn from_captures(regex: &Regex, caps: &regex::Captures<'_>) -> Self {
        let text = |m: Option<regex::Match<'_>>| m.map_or_else(String::new, |m| m.as_str().to_string());
        Self {
            whole: text(caps.get(0)),
            groups: (1..caps.len()).map(|i| text(caps.get(i))).collect(),
            named: regex
                .capture_names()
                .flatten()
                .map(|name| (name.to_string(), text(caps.name(name))))
                .collect(),
        }
    }
}

/// Compiles a pattern with dot-matches-newline and multi-line flags.
pub fn compile_pattern(source: &str) -> Result<Regex, ConfigurationError> {
    RegexBuilder::new(source)
        .dot_matches_new_line(true)
        .multi_line(true)
        .build()
        .map_err(|e| ConfigurationError::new(format!("invalid regex ({e})")))
}

/// Applies `regex` to `input`, yielding every match or only the first.
#[must_use]
pub fn apply_pattern(regex: &Regex, input: &str, multimatch: bool) -> Vec<PatternMatch> {
    let iter = regex
        .captures_iter(input)
        .map(|caps| PatternMatch::from_captures(regex, &caps));
    if multimatch {
        iter.collect()
    } else {
        iter.take(1).collect()
    }
}

/// Names of the capture groups of `regex`, for build-time scope shapes.
#[must_use]
pub fn group_shape(regex: &Regex) -> PatternMatch {
    PatternMatch {
        whole: String::new(),
        groups: vec![String::new(); regex.captures_len().saturating_sub(1)],
        named: regex
            .capture_names()
            .flatten()
            .map(|n| (n.to_string(), String::new()))
            .collect(),
    }
}
