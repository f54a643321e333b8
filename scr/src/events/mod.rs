//! Run events.
//!
//! The traversal controller reports what it does as [`ScrEvent`]s
//! delivered to an [`EventSink`]. Events carry the run id, a timestamp and
//! the chain and document they concern.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::chain::ChainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The run began.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A document was accepted into the frontier.
    #[serde(rename = "document.discovered")]
    DocumentDiscovered,
    /// A document was fetched.
    #[serde(rename = "document.fetched")]
    DocumentFetched,
    /// A document or content link could not be fetched.
    #[serde(rename = "fetch.failed")]
    FetchFailed,
    /// A content match reached its outputs.
    #[serde(rename = "content.finalized")]
    ContentFinalized,
    /// A content match was forwarded as a virtual document.
    #[serde(rename = "content.forwarded")]
    ContentForwarded,
    /// A match was dropped.
    #[serde(rename = "match.skipped")]
    MatchSkipped,
    /// A chain issued its last index.
    #[serde(rename = "chain.exhausted")]
    ChainExhausted,
    /// The run finished.
    #[serde(rename = "run.completed")]
    RunCompleted,
}

impl EventKind {
    /// The dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::DocumentDiscovered => "document.discovered",
            Self::DocumentFetched => "document.fetched",
            Self::FetchFailed => "fetch.failed",
            Self::ContentFinalized => "content.finalized",
            Self::ContentForwarded => "content.forwarded",
            Self::MatchSkipped => "match.skipped",
            Self::ChainExhausted => "chain.exhausted",
            Self::RunCompleted => "run.completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrEvent {
    /// What happened.
    pub kind: EventKind,
    /// The run that emitted the event.
    pub run_id: Uuid,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// The chain concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainId>,
    /// The document location concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Event specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ScrEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            timestamp: Utc::now(),
            chain: None,
            location: None,
            data: serde_json::Value::Null,
        }
    }

    /// Sets the chain.
    #[must_use]
    pub const fn with_chain(mut self, chain: ChainId) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Sets the document location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
