//! Pages and chain sets shared by tests.

use super::mocks::StaticFetcher;
use crate::chain::{Chain, ChainSetBuilder};
use crate::engine::CssQueryEngine;
use crate::errors::ConfigurationError;

/// A list, a heading and three links, one of them absolute.
pub const LINK_PAGE: &str = r#"<html><head><title>Link page</title></head><body>
<h1>Links</h1>
<ul><li data-x="1">first</li><li><span>two</span> second</li><li>third</li></ul>
<a href="a.html">A</a>
<a href="b.html">B</a>
<a href="https://other.org/c">C</a>
</body></html>"#;

/// Three items, the last one without a heading.
pub const LABELED_PAGE: &str = r#"<html><body>
<div class="item"><h2>Alpha</h2><p>one</p></div>
<div class="item"><h2>Beta</h2><p>two</p></div>
<div class="item"><p>three</p></div>
</body></html>"#;

/// Root of the site served by [`site`].
pub const SITE_ROOT: &str = "https://site.test/index.html";

/// Location of a page of the site served by [`site`].
#[must_use]
pub fn site_page(name: &str) -> String {
    format!("https://site.test/{name}")
}

/// A small site with a cycle:
///
/// ```text
/// index -> a, b
/// a     -> c, index
/// b     -> c
/// ```
///
/// Each page has its name in an `<h1>`.
#[must_use]
pub fn site() -> StaticFetcher {
    StaticFetcher::new()
        .with_document(
            SITE_ROOT,
            r#"<html><body><h1>Index</h1><a href="a.html">a</a><a href="b.html">b</a></body></html>"#,
        )
        .with_document(
            &site_page("a.html"),
            r#"<html><body><h1>A</h1><a href="c.html">c</a><a href="index.html">home</a></body></html>"#,
        )
        .with_document(
            &site_page("b.html"),
            r#"<html><body><h1>B</h1><a href="c.html">c</a></body></html>"#,
        )
        .with_document(&site_page("c.html"), "<html><body><h1>C</h1></body></html>")
}

/// Builds chains from option arguments with scripts enabled.
pub fn build_chains(args: &[&str]) -> Result<Vec<Chain>, ConfigurationError> {
    ChainSetBuilder::from_args(args)?.build(&CssQueryEngine::new(), true)
}
