//! XPath 1.0 queries over HTML.
//!
//! Documents are parsed leniently by `html5ever` (through `scraper`) and
//! copied into an `sxd_document` tree, which `sxd_xpath` evaluates. What
//! a selected node yields depends on its type:
//!
//! * elements yield their outer markup
//! * text nodes yield their text
//! * attributes yield their value
//!
//! Expressions evaluating to a string, number or boolean yield a single
//! match.

use super::query::{StructuralMatch, StructuralQuery};
use crate::errors::{ConfigurationError, MatchError};
use scraper::{ElementRef, Html, Node as HtmlNode};
use sxd_document::dom::{ChildOfElement, Document, Element};
use sxd_document::Package;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value, XPath};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// XPath engine backed by `sxd_xpath`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XPathQueryEngine;

impl XPathQueryEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn compile(query: &str) -> Result<XPath, String> {
        Factory::new()
            .build(query.trim())
            .map_err(|e| format!("invalid xpath '{}': {e}", query.trim()))?
            .ok_or_else(|| format!("empty xpath '{query}'"))
    }

    fn evaluate(query: &str, html: &Html, origin: &str) -> Result<Vec<StructuralMatch>, MatchError> {
        let xpath = Self::compile(query).map_err(|e| MatchError::new(e, origin))?;
        let package = Package::new();
        let doc = package.as_document();
        let root = copy_element(doc, html.root_element());
        doc.root().append_child(root);

        let context = Context::new();
        let value = xpath
            .evaluate(&context, doc.root())
            .map_err(|e| MatchError::new(format!("failed to evaluate '{query}': {e}"), origin))?;
        let matches = match value {
            Value::Nodeset(nodes) => nodes.document_order().into_iter().map(node_match).collect(),
            Value::String(s) => vec![scalar_match(s)],
            Value::Number(n) => vec![scalar_match(format!("{n}"))],
            Value::Boolean(b) => vec![scalar_match(b.to_string())],
        };
        Ok(matches)
    }
}

impl StructuralQuery for XPathQueryEngine {
    fn validate(&self, query: &str) -> Result<(), ConfigurationError> {
        Self::compile(query).map(|_| ()).map_err(ConfigurationError::new)
    }

    fn select(&self, query: &str, document: &str) -> Result<Vec<StructuralMatch>, MatchError> {
        Self::evaluate(query, &Html::parse_document(document), "<document>")
    }

    fn select_in_fragment(
        &self,
        query: &str,
        fragment: &str,
    ) -> Result<Vec<StructuralMatch>, MatchError> {
        Self::evaluate(query, &Html::parse_fragment(fragment), "<fragment>")
    }
}

fn scalar_match(text: String) -> StructuralMatch {
    StructuralMatch {
        fragment: text.clone(),
        text,
    }
}

fn node_match(node: Node<'_>) -> StructuralMatch {
    match node {
        Node::Element(el) => {
            let mut markup = String::new();
            write_element(&mut markup, el);
            scalar_match(markup)
        }
        Node::Root(root) => {
            let mut markup = String::new();
            for child in root.children() {
                if let Some(el) = child.element() {
                    write_element(&mut markup, el);
                }
            }
            scalar_match(markup)
        }
        Node::Attribute(attr) => scalar_match(attr.value().to_string()),
        other => scalar_match(other.string_value()),
    }
}

/// Copies an html5ever element and its subtree into `doc`.
fn copy_element<'d>(doc: Document<'d>, source: ElementRef<'_>) -> Element<'d> {
    let value = source.value();
    let el = doc.create_element(value.name());
    for (name, attr) in value.attrs() {
        el.set_attribute_value(name, attr);
    }
    for child in source.children() {
        match child.value() {
            HtmlNode::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    el.append_child(copy_element(doc, child));
                }
            }
            HtmlNode::Text(text) => el.append_child(doc.create_text(text)),
            HtmlNode::Comment(comment) => el.append_child(doc.create_comment(comment)),
            _ => {}
        }
    }
    el
}

fn write_element(out: &mut String, el: Element<'_>) {
    let name = el.name().local_part();
    out.push('<');
    out.push_str(name);
    for attr in el.attributes() {
        out.push(' ');
        out.push_str(attr.name().local_part());
        out.push_str("=\"");
        escape_into(out, attr.value(), true);
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    for child in el.children() {
        match child {
            ChildOfElement::Element(child) => write_element(out, child),
            ChildOfElement::Text(text) => escape_into(out, text.text(), false),
            ChildOfElement::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment.text());
                out.push_str("-->");
            }
            ChildOfElement::ProcessingInstruction(_) => {}
        }
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
