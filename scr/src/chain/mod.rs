//! Matching chains.
//!
//! A chain is a configured pipeline of three locators (content, label and
//! document) plus the index bounds, output formats and traversal
//! settings that apply to its matches. Chains are assembled from raw
//! options by [`ChainSetBuilder`] and are immutable once built.

pub mod builder;
pub mod config;
pub mod options;
pub mod spec;

pub use builder::ChainSetBuilder;
pub use config::ChainConfig;
pub use options::{ChainOption, DedupPolicy, OptionValue};
pub use spec::{parse_chain_spec, ChainId, ChainScope, ChainSelector, RangeItem};

use crate::format::FormatTemplate;
use regex::Regex;
use std::collections::BTreeSet;

/// Escape sequence ending multi-line interactive edits.
pub const DEFAULT_ESCAPE_SEQUENCE: &str = "<END>";
/// Print format used when a chain produces content but names no output.
pub const DEFAULT_CPF: &str = "{c}\\n";
/// Default write format for saved content.
pub const DEFAULT_CWF: &str = "{c}";
/// Default forwarding format.
pub const DEFAULT_CFF: &str = "{c}";
/// Default scheme for links without one.
pub const DEFAULT_SCHEME: &str = "https";
/// Default document and content encoding.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Which of the three locators of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    /// Content locator, placeholder prefix `c`.
    Content,
    /// Label locator, placeholder prefix `l`.
    Label,
    /// Document locator, placeholder prefix `d`.
    Document,
}

impl LocatorKind {
    /// The placeholder prefix of the locator.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Content => 'c',
            Self::Label => 'l',
            Self::Document => 'd',
        }
    }

    /// The placeholder holding the final value.
    #[must_use]
    pub const fn final_key(self) -> &'static str {
        match self {
            Self::Content => "cm",
            Self::Label => "l",
            Self::Document => "d",
        }
    }
}

/// A compiled locator.
#[derive(Debug, Clone)]
pub struct Locator {
    /// Which locator this is.
    pub kind: LocatorKind,
    /// Structural query, if any.
    pub query: Option<String>,
    /// Compiled pattern, if any.
    pub pattern: Option<Regex>,
    /// Script source, if any.
    pub script: Option<String>,
    /// Format applied last, if any.
    pub format: Option<FormatTemplate>,
    /// Keep every match instead of only the first.
    pub multimatch: bool,
    /// Ask before accepting each match.
    pub interactive: bool,
}

impl Locator {
    /// An inactive locator.
    #[must_use]
    pub const fn empty(kind: LocatorKind) -> Self {
        Self {
            kind,
            query: None,
            pattern: None,
            script: None,
            format: None,
            multimatch: true,
            interactive: false,
        }
    }

    /// Returns whether any stage is configured.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.query.is_some() || self.pattern.is_some() || self.script.is_some() || self.format.is_some()
    }
}

/// Inclusive index bounds. `max` of `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBounds {
    /// First index issued.
    pub min: i64,
    /// Last index issued.
    pub max: Option<i64>,
}

impl IndexBounds {
    /// Number of digits needed to print any index in the bounds.
    ///
    /// Unbounded ranges use three digits.
    #[must_use]
    pub fn digits(&self) -> usize {
        let min = self.min.to_string().len();
        let max = self.max.map_or(3, |m| m.to_string().len());
        min.max(max)
    }
}

/// How the scheme of a derived URL is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemePolicy {
    /// Scheme used when none can be inherited.
    pub default: String,
    /// Inherit the parent's scheme when it has a usable one.
    pub prefer_parent: bool,
    /// Always use `default`.
    pub forced: bool,
}

impl Default for SchemePolicy {
    fn default() -> Self {
        Self {
            default: DEFAULT_SCHEME.to_string(),
            prefer_parent: true,
            forced: false,
        }
    }
}

/// How the encoding of fetched bytes is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingPolicy {
    /// Encoding used when none is declared.
    pub default: String,
    /// Ignore declared encodings.
    pub forced: bool,
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self {
            default: DEFAULT_ENCODING.to_string(),
            forced: false,
        }
    }
}

impl EncodingPolicy {
    /// Picks the encoding for bytes that declared `declared`.
    #[must_use]
    pub fn resolve(&self, declared: Option<&str>) -> String {
        match declared {
            Some(enc) if !self.forced && !enc.is_empty() => enc.to_string(),
            _ => self.default.clone(),
        }
    }
}

/// Where finalized content goes.
#[derive(Debug, Clone, Default)]
pub struct OutputFormats {
    /// Printed to stdout.
    pub print: Option<FormatTemplate>,
    /// Path of a file to save to.
    pub save: Option<FormatTemplate>,
    /// Data written to the saved file.
    pub write: Option<FormatTemplate>,
    /// Shell command to run.
    pub shell: Option<FormatTemplate>,
    /// Stdin of the shell command.
    pub shell_stdin: Option<FormatTemplate>,
    /// Print the output of shell commands.
    pub shell_print: bool,
    /// Overwrite existing files.
    pub overwrite: bool,
    /// Ask before saving to the rendered path.
    pub save_interactive: bool,
}

impl OutputFormats {
    /// All configured templates.
    pub fn templates(&self) -> impl Iterator<Item = &FormatTemplate> {
        [
            &self.print,
            &self.save,
            &self.write,
            &self.shell,
            &self.shell_stdin,
        ]
        .into_iter()
        .flatten()
    }

    /// Returns whether any output template references one of `names`.
    #[must_use]
    pub fn references_any(&self, names: &[&str]) -> bool {
        self.templates().any(|t| t.references_any(names))
    }
}

/// A compiled, immutable chain.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Chain id.
    pub id: ChainId,
    /// Content locator.
    pub content: Locator,
    /// Label locator.
    pub label: Locator,
    /// Document locator.
    pub document: Locator,
    /// The chain produces content.
    pub has_content_matching: bool,
    /// The chain has an active label locator.
    pub has_label_matching: bool,
    /// The chain discovers documents.
    pub has_document_matching: bool,
    /// Content index bounds.
    pub content_indices: IndexBounds,
    /// Keep counting content indices across documents.
    pub content_index_continuous: bool,
    /// Document index bounds.
    pub document_indices: IndexBounds,
    /// Content matches are links to the actual content.
    pub content_is_link: bool,
    /// Outputs for finalized content.
    pub output: OutputFormats,
    /// Chains receiving forwarded content.
    pub forward_chains: BTreeSet<ChainId>,
    /// Format of forwarded virtual documents.
    pub forward_format: FormatTemplate,
    /// Chains consuming documents this chain discovers.
    pub document_chains: BTreeSet<ChainId>,
    /// Duplication policy for documents this chain discovers.
    pub dedup: DedupPolicy,
    /// Scheme selection for discovered links.
    pub schemes: SchemePolicy,
    /// Encoding of documents this chain discovers.
    pub document_encoding: EncodingPolicy,
    /// Encoding of content links.
    pub content_encoding: EncodingPolicy,
    /// Match labels inside the content match.
    pub labels_inside_content: bool,
    /// Keep content without a label.
    pub label_allow_missing: bool,
    /// Accept labels containing path separators.
    pub label_allow_slashes: bool,
    /// Label rendered when none was matched.
    pub label_default_format: Option<FormatTemplate>,
    /// Filename used when a content link provides none.
    pub filename_default_format: Option<FormatTemplate>,
    /// Escape sequence for multi-line edits.
    pub escape_sequence: String,
    /// Outputs reference `{c}`.
    pub need_content: bool,
    /// Outputs reference `{l}`.
    pub need_label: bool,
    /// Outputs reference `{fn}`, `{fb}` or `{fe}`.
    pub need_filename: bool,
}

impl Chain {
    /// Returns whether content is forwarded as virtual documents.
    #[must_use]
    pub fn forwards_content(&self) -> bool {
        !self.forward_chains.is_empty()
    }

    /// Index context shown in prompts and logs, e.g. ` (di=1, ci=2)`.
    #[must_use]
    pub fn index_context(&self, di: i64, ci: i64) -> String {
        match (self.has_document_matching, self.content.multimatch) {
            (true, true) => format!(" (di={di}, ci={ci})"),
            (true, false) => format!(" (di={di})"),
            (false, true) => format!(" (ci={ci})"),
            (false, false) => String::new(),
        }
    }

    /// Returns whether `label` may be used.
    #[must_use]
    pub fn is_valid_label(&self, label: &str) -> bool {
        self.label_allow_slashes || !(label.contains('/') || label.contains('\\'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_digits() {
        assert_eq!(IndexBounds { min: 1, max: None }.digits(), 3);
        assert_eq!(IndexBounds { min: 1, max: Some(5) }.digits(), 1);
        assert_eq!(IndexBounds { min: 0, max: Some(1200) }.digits(), 4);
    }

    #[test]
    fn test_encoding_policy() {
        let policy = EncodingPolicy::default();
        assert_eq!(policy.resolve(Some("windows-1252")), "windows-1252");
        assert_eq!(policy.resolve(None), "utf-8");

        let forced = EncodingPolicy {
            default: "utf-16le".into(),
            forced: true,
        };
        assert_eq!(forced.resolve(Some("windows-1252")), "utf-16le");
    }

    #[test]
    fn test_locator_activity() {
        let mut loc = Locator::empty(LocatorKind::Label);
        assert!(!loc.is_active());
        loc.query = Some("span".into());
        assert!(loc.is_active());
        assert_eq!(LocatorKind::Label.final_key(), "l");
        assert_eq!(LocatorKind::Content.prefix(), 'c');
    }
}
