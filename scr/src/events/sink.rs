//! Event sink trait and implementations.

use super::{EventKind, ScrEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Receives run events.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &ScrEvent);

    /// Emits an event without blocking.
    ///
    /// Must never fail. Errors are logged but suppressed.
    fn try_emit(&self, event: &ScrEvent);
}

/// Discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &ScrEvent) {}

    fn try_emit(&self, _event: &ScrEvent) {}
}

/// Mirrors events into `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at `level`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event: &ScrEvent) {
        if self.level == Level::DEBUG || self.level == Level::TRACE {
            debug!(
                event_type = %event.kind,
                chain = ?event.chain,
                location = ?event.location,
                event_data = %event.data,
                "Event: {}", event.kind
            );
        } else {
            info!(
                event_type = %event.kind,
                chain = ?event.chain,
                location = ?event.location,
                event_data = %event.data,
                "Event: {}", event.kind
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &ScrEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &ScrEvent) {
        self.log_event(event);
    }
}

/// Keeps every event, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<ScrEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ScrEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the events of `kind`.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<ScrEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Counts the events of `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.read().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &ScrEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &ScrEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(kind: EventKind) -> ScrEvent {
        ScrEvent::new(kind, Uuid::nil())
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(&event(EventKind::RunStarted)).await;
        let sink = LoggingEventSink::info();
        sink.emit(&event(EventKind::DocumentFetched).with_location("a.html")).await;
        sink.try_emit(&event(EventKind::RunCompleted));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&event(EventKind::RunStarted)).await;
        sink.try_emit(&event(EventKind::ContentFinalized).with_chain(1));
        sink.try_emit(&event(EventKind::ContentFinalized).with_chain(0));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count(EventKind::ContentFinalized), 2);
        assert_eq!(sink.events_of_kind(EventKind::ContentFinalized)[0].chain, Some(1));

        sink.clear();
        assert!(sink.is_empty());
    }
}
