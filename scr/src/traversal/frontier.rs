//! The traversal frontier and the document arena.
//!
//! Every admitted document gets an arena node recording its identity,
//! parent and depth. Parents are plain indices, so ancestry checks never
//! keep documents alive.

use crate::chain::DedupPolicy;
use crate::document::{Document, DocumentKey, NodeId};
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// Order in which discovered documents are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Depth first: new documents are visited before older ones.
    #[default]
    DepthFirst,
    /// Breadth first: new documents are visited after older ones.
    BreadthFirst,
}

#[derive(Debug)]
struct Node {
    key: DocumentKey,
    parent: Option<NodeId>,
    depth: usize,
    document: Option<Document>,
}

/// Queue of documents to visit plus the dedup state.
#[derive(Debug, Default)]
pub struct Frontier {
    order: TraversalOrder,
    queue: VecDeque<NodeId>,
    nodes: Vec<Node>,
    seen: HashSet<DocumentKey>,
}

impl Frontier {
    /// Creates an empty frontier.
    #[must_use]
    pub fn new(order: TraversalOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Returns whether `key` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_on_path(&self, key: &DocumentKey, node: Option<NodeId>) -> bool {
        let mut cursor = node;
        while let Some(id) = cursor {
            let Some(n) = self.nodes.get(id) else {
                return false;
            };
            if &n.key == key {
                return true;
            }
            cursor = n.parent;
        }
        false
    }

    /// Registers `doc` in the arena if `policy` lets it through.
    ///
    /// Admitted documents are not visited until passed to
    /// [`Self::enqueue`].
    pub fn admit(&mut self, doc: Document, policy: DedupPolicy) -> Option<NodeId> {
        let key = doc.key();
        let rejected = match policy {
            DedupPolicy::Allowed => false,
            DedupPolicy::Nonrecursive => self.is_on_path(&key, doc.parent),
            DedupPolicy::Unique => self.seen.contains(&key),
        };
        if rejected {
            trace!(document = %key, ?policy, "duplicate document rejected");
            return None;
        }
        self.seen.insert(key.clone());
        let id = self.nodes.len();
        self.nodes.push(Node {
            key,
            parent: doc.parent,
            depth: doc.depth,
            document: Some(doc),
        });
        Some(id)
    }

    /// Schedules admitted documents discovered together.
    ///
    /// Depth first pushes the batch to the front in reverse so it is
    /// visited in discovery order.
    pub fn enqueue(&mut self, batch: &[NodeId]) {
        match self.order {
            TraversalOrder::BreadthFirst => self.queue.extend(batch.iter().copied()),
            TraversalOrder::DepthFirst => {
                for id in batch.iter().rev() {
                    self.queue.push_front(*id);
                }
            }
        }
    }

    /// Takes the next document to visit.
    pub fn pop(&mut self) -> Option<(NodeId, Document)> {
        while let Some(id) = self.queue.pop_front() {
            if let Some(doc) = self.nodes.get_mut(id).and_then(|n| n.document.take()) {
                return Some((id, doc));
            }
        }
        None
    }

    /// Returns whether no document is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of documents waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Depth of an arena node.
    #[must_use]
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(id).map(|n| n.depth)
    }

    /// Drops every waiting document.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
