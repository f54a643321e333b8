//! Forwarding content as virtual documents.
//!
//! A chain with forward targets turns each finalized content match into
//! a [`DocumentKind::Virtual`](crate::document::DocumentKind::Virtual)
//! document. The controller enqueues it like any discovered document,
//! under the forwarding chain's dedup policy.

use crate::chain::Chain;
use crate::document::{Document, NodeId};

/// Builds the virtual document carrying `text` forwarded by `chain`.
///
/// The source document becomes the parent, so links found in the
/// forwarded text resolve against the source and ancestry checks see
/// the whole path.
#[must_use]
pub fn forward_document(text: String, chain: &Chain, source: &Document, source_id: NodeId) -> Document {
    let mut doc = Document::forwarded(text, source, chain.id, chain.forward_chains.clone());
    doc.parent = Some(source_id);
    doc
}
