//! Structural queries over parsed documents.
//!
//! Two engines ship with the crate: XPath (the default, see
//! [`super::xpath`]) and CSS selectors through `scraper`. A CSS query
//! may end in a pseudo suffix choosing what each selected node yields:
//!
//! * `::html` (default) the outer HTML of the node
//! * `::inner` the inner HTML
//! * `::text` the concatenated text content
//! * `::attr(name)` the value of an attribute; nodes without it are skipped

use super::xpath::XPathQueryEngine;
use crate::errors::{ConfigurationError, MatchError};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// One node selected by a structural query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralMatch {
    /// The value the query yields for the node.
    pub text: String,
    /// Markup of the selected node, used to match labels inside content.
    pub fragment: String,
}

/// A structural query engine.
///
/// Implementations are synchronous: parsed documents are not kept across
/// await points.
pub trait StructuralQuery: Send + Sync + Debug {
    /// Checks that `query` is well formed.
    fn validate(&self, query: &str) -> Result<(), ConfigurationError>;

    /// Evaluates `query` against a whole document.
    fn select(&self, query: &str, document: &str) -> Result<Vec<StructuralMatch>, MatchError>;

    /// Evaluates `query` against a fragment produced by an earlier match.
    fn select_in_fragment(
        &self,
        query: &str,
        fragment: &str,
    ) -> Result<Vec<StructuralMatch>, MatchError>;
}

/// Language of the structural queries of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    /// XPath 1.0.
    #[default]
    XPath,
    /// CSS selectors with pseudo suffixes.
    Css,
}

impl QueryLanguage {
    /// Every language, for option matching.
    pub const ALL: [Self; 2] = [Self::XPath, Self::Css];

    /// The option value naming the language.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::XPath => "xpath",
            Self::Css => "css",
        }
    }

    /// The engine evaluating the language.
    #[must_use]
    pub fn engine(self) -> Arc<dyn StructuralQuery> {
        match self {
            Self::XPath => Arc::new(XPathQueryEngine::new()),
            Self::Css => Arc::new(CssQueryEngine::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Extract {
    OuterHtml,
    InnerHtml,
    Text,
    Attr(String),
}

/// CSS selector engine backed by `scraper`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssQueryEngine;

impl CssQueryEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn split(query: &str) -> Result<(Selector, Extract), String> {
        let query = query.trim();
        let (selector, extract) = if let Some(sel) = query.strip_suffix("::text") {
            (sel, Extract::Text)
        } else if let Some(sel) = query.strip_suffix("::html") {
            (sel, Extract::OuterHtml)
        } else if let Some(sel) = query.strip_suffix("::inner") {
            (sel, Extract::InnerHtml)
        } else if let Some(idx) = query.rfind("::attr(") {
            let rest = &query[idx + "::attr(".len()..];
            let name = rest
                .strip_suffix(')')
                .ok_or_else(|| format!("unterminated attribute suffix in '{query}'"))?
                .trim();
            if name.is_empty() {
                return Err(format!("empty attribute name in '{query}'"));
            }
            (&query[..idx], Extract::Attr(name.to_string()))
        } else {
            (query, Extract::OuterHtml)
        };
        let selector = selector.trim();
        let selector = if selector.is_empty() { ":root" } else { selector };
        Selector::parse(selector)
            .map(|s| (s, extract))
            .map_err(|e| format!("invalid css selector '{selector}': {e}"))
    }

    fn collect(html: &Html, selector: &Selector, extract: &Extract) -> Vec<StructuralMatch> {
        html.select(selector)
            .filter_map(|el| Self::extract(el, extract))
            .collect()
    }

    fn extract(el: ElementRef<'_>, extract: &Extract) -> Option<StructuralMatch> {
        let fragment = el.html();
        let text = match extract {
            Extract::OuterHtml => fragment.clone(),
            Extract::InnerHtml => el.inner_html(),
            Extract::Text => el.text().collect::<String>(),
            Extract::Attr(name) => el.value().attr(name)?.to_string(),
        };
        Some(StructuralMatch { text, fragment })
    }
}

impl StructuralQuery for CssQueryEngine {
    fn validate(&self, query: &str) -> Result<(), ConfigurationError> {
        Self::split(query).map(|_| ()).map_err(ConfigurationError::new)
    }

    fn select(&self, query: &str, document: &str) -> Result<Vec<StructuralMatch>, MatchError> {
        let (selector, extract) = Self::split(query).map_err(|e| MatchError::new(e, "<document>"))?;
        let html = Html::parse_document(document);
        Ok(Self::collect(&html, &selector, &extract))
    }

    fn select_in_fragment(
        &self,
        query: &str,
        fragment: &str,
    ) -> Result<Vec<StructuralMatch>, MatchError> {
        let (selector, extract) = Self::split(query).map_err(|e| MatchError::new(e, "<fragment>"))?;
        let html = Html::parse_fragment(fragment);
        Ok(Self::collect(&html, &selector, &extract))
    }
}
