//! # scr
//!
//! Chain-based content extraction and document crawling.
//!
//! A run applies one or more *chains* to a graph of documents. Each chain
//! has three locators:
//!
//! - **content**: selects the values that end up in the outputs
//! - **label**: names each content match, e.g. for file names
//! - **document**: selects links to further documents
//!
//! Every locator runs a structural query (XPath, or CSS with `ql=css`), a regular expression, a script
//! and a format template, in that order, skipping the stages it does not
//! configure. Documents are visited depth first or breadth first, links
//! are deduplicated, and content can be forwarded to other chains as a
//! virtual document.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scr::prelude::*;
//!
//! let config = parse_args(&["url=https://example.org", "cx=//h1/text()", "dx=//a/@href"])?;
//! let (chains, documents) = config.build(&XPathQueryEngine::new(), false)?;
//! let summary = Crawler::new(chains, config.run).run(documents).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod args;
pub mod cancellation;
pub mod chain;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fetch;
pub mod format;
pub mod index;
pub mod observability;
pub mod output;
pub mod testing;
pub mod traversal;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::args::{parse_args, ScrConfig};
    pub use crate::cancellation::CancellationToken;
    pub use crate::chain::{Chain, ChainId, ChainSetBuilder, DedupPolicy};
    pub use crate::config::RunConfig;
    pub use crate::document::{Document, DocumentKind};
    pub use crate::engine::{
        CssQueryEngine, Interaction, PromptResponse, QueryLanguage, ScriptEvaluator, StructuralQuery,
        XPathQueryEngine,
    };
    pub use crate::errors::{
        ConfigurationError, FetchError, FetchErrorKind, FormatError, MatchError, ScrError,
    };
    pub use crate::events::{CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, ScrEvent};
    pub use crate::fetch::{DocumentFetcher, FetchConfig, Fetcher};
    pub use crate::format::{FormatTemplate, Scope, Value};
    pub use crate::observability::{init_tracing, Verbosity};
    pub use crate::output::{OutputSink, StandardOutputSink};
    pub use crate::traversal::{Crawler, RunSummary, TraversalOrder};
}
