//! Content and document index allocation.
//!
//! Every chain owns two counters. Indices are handed out when a match is
//! attempted, strictly increasing, and never outside `[min, max]`.

use crate::chain::{Chain, ChainId, IndexBounds};
use serde::{Deserialize, Serialize};

/// Which counter of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// `ci`, per content match.
    Content,
    /// `di`, per document evaluated.
    Document,
}

/// Result of asking for an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexGrant {
    /// The index to use.
    Issued(i64),
    /// The maximum has already been issued.
    Exhausted,
}

/// A bounded, monotonically increasing counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAllocator {
    bounds: IndexBounds,
    next: i64,
}

impl IndexAllocator {
    /// Creates an allocator starting at `bounds.min`.
    #[must_use]
    pub const fn new(bounds: IndexBounds) -> Self {
        Self {
            next: bounds.min,
            bounds,
        }
    }

    /// The index the next call to [`Self::next_index`] would issue.
    #[must_use]
    pub fn peek(&self) -> Option<i64> {
        match self.bounds.max {
            Some(max) if self.next > max => None,
            _ => Some(self.next),
        }
    }

    /// Issues the next index.
    pub fn next_index(&mut self) -> IndexGrant {
        match self.peek() {
            Some(idx) => {
                self.next += 1;
                IndexGrant::Issued(idx)
            }
            None => IndexGrant::Exhausted,
        }
    }

    /// Returns to the minimum.
    pub fn reset(&mut self) {
        self.next = self.bounds.min;
    }

    /// Returns whether the maximum has been issued.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.peek().is_none()
    }
}

/// Counters of every chain, owned by the traversal controller.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    content: Vec<IndexAllocator>,
    document: Vec<IndexAllocator>,
}

impl IndexRegistry {
    /// Creates counters for `chains`.
    #[must_use]
    pub fn new(chains: &[Chain]) -> Self {
        Self {
            content: chains
                .iter()
                .map(|c| IndexAllocator::new(c.content_indices))
                .collect(),
            document: chains
                .iter()
                .map(|c| IndexAllocator::new(c.document_indices))
                .collect(),
        }
    }

    fn allocator(&mut self, chain: ChainId, kind: IndexKind) -> Option<&mut IndexAllocator> {
        match kind {
            IndexKind::Content => self.content.get_mut(chain),
            IndexKind::Document => self.document.get_mut(chain),
        }
    }

    /// Issues the next index of `chain`.
    pub fn next_index(&mut self, chain: ChainId, kind: IndexKind) -> IndexGrant {
        self.allocator(chain, kind)
            .map_or(IndexGrant::Exhausted, IndexAllocator::next_index)
    }

    /// Resets a counter of `chain` to its minimum.
    pub fn reset(&mut self, chain: ChainId, kind: IndexKind) {
        if let Some(alloc) = self.allocator(chain, kind) {
            alloc.reset();
        }
    }

    /// The next index of `chain` without issuing it.
    #[must_use]
    pub fn peek(&self, chain: ChainId, kind: IndexKind) -> Option<i64> {
        let alloc = match kind {
            IndexKind::Content => self.content.get(chain),
            IndexKind::Document => self.document.get(chain),
        };
        alloc.and_then(IndexAllocator::peek)
    }

    /// Returns whether another index of `kind` is available.
    #[must_use]
    pub fn has_next(&self, chain: ChainId, kind: IndexKind) -> bool {
        self.peek(chain, kind).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min: i64, max: Option<i64>) -> IndexBounds {
        IndexBounds { min, max }
    }

    #[test]
    fn test_allocator_issues_within_bounds() {
        let mut alloc = IndexAllocator::new(bounds(1, Some(3)));
        assert_eq!(alloc.next_index(), IndexGrant::Issued(1));
        assert_eq!(alloc.next_index(), IndexGrant::Issued(2));
        assert_eq!(alloc.peek(), Some(3));
        assert_eq!(alloc.next_index(), IndexGrant::Issued(3));
        assert!(alloc.is_exhausted());
        assert_eq!(alloc.next_index(), IndexGrant::Exhausted);
        assert_eq!(alloc.next_index(), IndexGrant::Exhausted);
    }

    #[test]
    fn test_reset_returns_to_min() {
        let mut alloc = IndexAllocator::new(bounds(5, Some(5)));
        assert_eq!(alloc.next_index(), IndexGrant::Issued(5));
        assert!(alloc.is_exhausted());
        alloc.reset();
        assert_eq!(alloc.next_index(), IndexGrant::Issued(5));
    }

    #[test]
    fn test_unbounded() {
        let mut alloc = IndexAllocator::new(bounds(0, None));
        for expected in 0..1000 {
            assert_eq!(alloc.next_index(), IndexGrant::Issued(expected));
        }
        assert!(!alloc.is_exhausted());
    }

    #[test]
    fn test_strictly_increasing_without_reset() {
        let mut alloc = IndexAllocator::new(bounds(-2, Some(10)));
        let mut last = None;
        while let IndexGrant::Issued(i) = alloc.next_index() {
            assert!(last.map_or(true, |l| i > l));
            assert!((-2..=10).contains(&i));
            last = Some(i);
        }
        assert_eq!(last, Some(10));
    }

    #[test]
    fn test_registry_unknown_chain_is_exhausted() {
        let mut registry = IndexRegistry::default();
        assert_eq!(
            registry.next_index(3, IndexKind::Content),
            IndexGrant::Exhausted
        );
        assert!(!registry.has_next(3, IndexKind::Document));
    }
}
