//! Testing utilities for scr.
//!
//! This module provides:
//! - Fakes for every collaborator of the crawler
//! - HTML fixtures and a small in-memory site
//! - Assertions over run summaries and events

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::{assert_clean_run, assert_event_count, assert_printed_lines};
pub use fixtures::{build_chains, site, site_page, LABELED_PAGE, LINK_PAGE, SITE_ROOT};
pub use mocks::{
    CollectingOutputSink, FakeScriptEvaluator, RecordedCommand, ScriptedInteraction, StaticFetcher,
    StaticHttpClient,
};
