//! Documents and their identity.
//!
//! A document is anything a chain can match against: a URL, a file, a
//! literal string or a virtual document forwarded from a content match.
//! Links discovered in a document are normalized against it before they
//! become documents themselves.

use crate::chain::{ChainId, EncodingPolicy, SchemePolicy};
use crate::engine::matcher::LocatorMatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Index of a document in the traversal arena.
pub type NodeId = usize;

/// How a document is obtained and how its links resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Fetched over HTTP, links are URLs.
    Url,
    /// Read from disk, links are file paths.
    File,
    /// Read from disk, links are URLs.
    RFile,
    /// Literal text, links are file paths.
    Str,
    /// Literal text, links are URLs.
    RStr,
    /// Forwarded content, links resolve like its source document's.
    Virtual,
}

impl DocumentKind {
    /// Every kind that can be named on the command line.
    pub const INITIAL: &'static [Self] = &[Self::Url, Self::File, Self::RFile, Self::Str, Self::RStr];

    /// The kind of documents discovered in a document of this kind.
    #[must_use]
    pub const fn derived(self) -> Self {
        match self {
            Self::Url | Self::RFile | Self::RStr => Self::Url,
            Self::File | Self::Str => Self::File,
            Self::Virtual => Self::Virtual,
        }
    }

    /// Returns whether the content is part of the document itself.
    #[must_use]
    pub const fn is_literal(self) -> bool {
        matches!(self, Self::Str | Self::RStr | Self::Virtual)
    }

    /// The command-line name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::File => "file",
            Self::RFile => "rfile",
            Self::Str => "str",
            Self::RStr => "rstr",
            Self::Virtual => "virtual",
        }
    }

    /// Looks a kind up by its command-line name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::INITIAL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The identity of a document for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Document kind.
    pub kind: DocumentKind,
    /// Resolved location.
    pub location: String,
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.location)
    }
}

/// What relative links found in a document resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBase {
    /// Kind given to discovered documents, [`DocumentKind::Url`] or
    /// [`DocumentKind::File`].
    pub kind: DocumentKind,
    /// Location relative links are joined onto, if any.
    pub location: Option<String>,
}

impl LinkBase {
    /// The link base of a document of `kind` at `location`.
    #[must_use]
    pub fn for_document(kind: DocumentKind, location: &str) -> Self {
        let location = match kind {
            DocumentKind::Url | DocumentKind::File => Some(location.to_string()),
            _ => None,
        };
        Self {
            kind: kind.derived(),
            location,
        }
    }
}

/// A document waiting to be fetched and matched.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document kind.
    pub kind: DocumentKind,
    /// Resolved location. For literal kinds this is the text itself.
    pub location: String,
    /// Content of literal documents.
    pub literal: Option<String>,
    /// Encoding selection for the fetched bytes.
    pub encoding: EncodingPolicy,
    /// Chain whose document locator produced this document.
    pub origin_chain: Option<ChainId>,
    /// Chains that match against this document.
    pub consumers: BTreeSet<ChainId>,
    /// Arena node of the document this one was discovered in.
    pub parent: Option<NodeId>,
    /// Number of hops from an initial document.
    pub depth: usize,
    /// The document locator match that produced this document.
    pub locator_match: Option<LocatorMatch>,
    /// How links found in this document resolve.
    pub link_base: LinkBase,
}

impl Document {
    /// An initial document named on the command line.
    #[must_use]
    pub fn initial(kind: DocumentKind, location: impl Into<String>, consumers: BTreeSet<ChainId>) -> Self {
        let location = location.into();
        Self {
            kind,
            literal: kind.is_literal().then(|| location.clone()),
            link_base: LinkBase::for_document(kind, &location),
            location,
            encoding: EncodingPolicy::default(),
            origin_chain: None,
            consumers,
            parent: None,
            depth: 0,
            locator_match: None,
        }
    }

    /// A virtual document carrying forwarded content.
    #[must_use]
    pub fn forwarded(text: impl Into<String>, source: &Self, origin: ChainId, consumers: BTreeSet<ChainId>) -> Self {
        let text = text.into();
        Self {
            kind: DocumentKind::Virtual,
            literal: Some(text.clone()),
            location: text,
            encoding: source.encoding.clone(),
            origin_chain: Some(origin),
            consumers,
            parent: None,
            depth: source.depth + 1,
            locator_match: None,
            link_base: source.link_base.clone(),
        }
    }

    /// The deduplication identity.
    #[must_use]
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            kind: self.kind,
            location: self.location.clone(),
        }
    }
}

/// Picks the scheme for a link that carries none.
#[must_use]
pub fn choose_scheme<'a>(parent: Option<&'a str>, policy: &'a SchemePolicy) -> &'a str {
    if policy.forced {
        return &policy.default;
    }
    match parent {
        Some(s) if policy.prefer_parent && !s.is_empty() && s != "file" => s,
        _ => &policy.default,
    }
}

fn replace_scheme(url: &str, scheme: &str) -> String {
    match url.find("://") {
        Some(idx) => format!("{scheme}{}", &url[idx..]),
        None => url.to_string(),
    }
}

fn has_scheme(link: &str) -> bool {
    link.contains("://") || link.starts_with("data:") || link.starts_with("mailto:")
}

/// Normalizes a path without touching the file system.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves a discovered link against the document it was found in.
#[must_use]
pub fn normalize_link(link: &str, base: &LinkBase, policy: &SchemePolicy) -> String {
    let link = link.trim();
    if base.kind == DocumentKind::File {
        let path = Path::new(link);
        let joined = match base.location.as_deref().map(Path::new).and_then(Path::parent) {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        return normalize_path(&joined).to_string_lossy().into_owned();
    }

    let parent = base.location.as_deref().and_then(|l| Url::parse(l).ok());
    let parent_scheme = parent.as_ref().map(Url::scheme);
    if has_scheme(link) {
        if policy.forced && link.contains("://") {
            return replace_scheme(link, &policy.default);
        }
        return link.to_string();
    }
    if let Some(rest) = link.strip_prefix("//") {
        return format!("{}://{rest}", choose_scheme(parent_scheme, policy));
    }
    match parent {
        Some(ref p) => match p.join(link) {
            Ok(joined) if joined.has_host() => {
                replace_scheme(joined.as_str(), choose_scheme(parent_scheme, policy))
            }
            Ok(joined) => joined.to_string(),
            Err(_) => link.to_string(),
        },
        None if link.is_empty() => String::new(),
        None => format!("{}://{link}", choose_scheme(None, policy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn url_base(location: &str) -> LinkBase {
        LinkBase::for_document(DocumentKind::Url, location)
    }

    fn policy(default: &str, prefer_parent: bool, forced: bool) -> SchemePolicy {
        SchemePolicy {
            default: default.to_string(),
            prefer_parent,
            forced,
        }
    }

    #[test]
    fn test_kind_derivation() {
        assert_eq!(DocumentKind::RFile.derived(), DocumentKind::Url);
        assert_eq!(DocumentKind::Str.derived(), DocumentKind::File);
        assert_eq!(DocumentKind::RStr.derived(), DocumentKind::Url);
        assert_eq!(DocumentKind::from_name("rstr"), Some(DocumentKind::RStr));
        assert_eq!(DocumentKind::from_name("virtual"), None);
    }

    #[test]
    fn test_file_links() {
        let base = LinkBase::for_document(DocumentKind::File, "site/dir/index.html");
        let p = SchemePolicy::default();
        assert_eq!(normalize_link("../a.html", &base, &p), "site/a.html");
        assert_eq!(normalize_link("./b/c.html", &base, &p), "site/dir/b/c.html");
        assert_eq!(normalize_link("/x/../y", &base, &p), "/y");
    }

    #[test]
    fn test_string_links_are_relative_to_cwd() {
        let base = LinkBase::for_document(DocumentKind::Str, "<a href='x'>");
        assert_eq!(base.kind, DocumentKind::File);
        assert_eq!(normalize_link("a/../b.html", &base, &SchemePolicy::default()), "b.html");
    }

    #[test]
    fn test_relative_url_links() {
        let base = url_base("https://a.org/dir/p.html");
        let p = SchemePolicy::default();
        assert_eq!(normalize_link("q.html", &base, &p), "https://a.org/dir/q.html");
        assert_eq!(normalize_link("/r", &base, &p), "https://a.org/r");
        assert_eq!(normalize_link("//cdn.org/x", &base, &p), "https://cdn.org/x");
        assert_eq!(normalize_link("http://b.org/", &base, &p), "http://b.org/");
    }

    #[test]
    fn test_parent_scheme_preference() {
        let base = url_base("http://a.org/");
        assert_eq!(
            normalize_link("//cdn.org/x", &base, &policy("https", true, false)),
            "http://cdn.org/x"
        );
        assert_eq!(
            normalize_link("q", &base, &policy("https", false, false)),
            "https://a.org/q"
        );
    }

    #[test]
    fn test_forced_scheme() {
        let base = url_base("https://a.org/");
        let p = policy("http", false, true);
        assert_eq!(normalize_link("https://b.org/x", &base, &p), "http://b.org/x");
        assert_eq!(normalize_link("y", &base, &p), "http://a.org/y");
    }

    #[test]
    fn test_bare_host_without_parent() {
        let base = LinkBase::for_document(DocumentKind::RFile, "links.txt");
        assert_eq!(base.location, None);
        assert_eq!(
            normalize_link("example.com/x", &base, &SchemePolicy::default()),
            "https://example.com/x"
        );
    }

    #[test]
    fn test_forwarded_document_inherits_link_base() {
        let source = Document::initial(DocumentKind::Url, "https://a.org/", BTreeSet::from([0]));
        let fwd = Document::forwarded("<a href='b'>", &source, 0, BTreeSet::from([1]));
        assert_eq!(fwd.kind, DocumentKind::Virtual);
        assert_eq!(fwd.literal.as_deref(), Some("<a href='b'>"));
        assert_eq!(fwd.depth, 1);
        assert_eq!(normalize_link("b", &fwd.link_base, &SchemePolicy::default()), "https://a.org/b");
        assert_ne!(fwd.key(), source.key());
    }
}
