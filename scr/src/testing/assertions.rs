//! Test assertions for runs.

use super::mocks::CollectingOutputSink;
use crate::events::{CollectingEventSink, EventKind};
use crate::traversal::RunSummary;

/// Asserts that the run had no recoverable errors.
pub fn assert_clean_run(summary: &RunSummary) {
    assert!(
        !summary.has_failures(),
        "Expected a clean run, got {summary:?}"
    );
}

/// Asserts that `kind` was emitted `expected` times.
pub fn assert_event_count(events: &CollectingEventSink, kind: EventKind, expected: usize) {
    let actual = events.count(kind);
    assert_eq!(
        actual, expected,
        "Expected {expected} '{kind}' events, got {actual}"
    );
}

/// Asserts the printed output line by line.
pub fn assert_printed_lines(output: &CollectingOutputSink, expected: &[&str]) {
    let actual = output.printed_lines();
    assert_eq!(
        actual, expected,
        "Unexpected printed output:\n{}",
        output.printed()
    );
}
