//! Locator evaluation.
//!
//! A locator runs up to four stages against its input: a structural
//! query, a regular expression, a script and a format. The first three
//! live here; formats are rendered by the traversal controller once the
//! indices of a match are known.

pub mod interact;
pub mod matcher;
pub mod pattern;
pub mod query;
pub mod script;
pub mod xpath;

pub use interact::{AutoAccept, Interaction, Prompt, PromptKind, PromptResponse};
pub use matcher::{
    ContentCandidates, ContentMatch, ContentPlan, GeneralScope, LocatorMatch, Matcher,
};
pub use pattern::{compile_pattern, PatternMatch};
pub use query::{CssQueryEngine, QueryLanguage, StructuralMatch, StructuralQuery};
pub use script::ScriptEvaluator;
pub use xpath::XPathQueryEngine;

#[cfg(feature = "terminal")]
pub use interact::TerminalInteraction;
