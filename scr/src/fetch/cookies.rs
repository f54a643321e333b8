//! Netscape cookie jars.
//!
//! The format is the one written by curl and browser exporters: one
//! cookie per line, seven tab separated fields, `#` comments. A line
//! prefixed with `#HttpOnly_` is a cookie, not a comment.
//!
//! Expiry dates are read but not enforced, every cookie of the file is
//! sent as a session cookie.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One cookie of a jar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    /// Domain, with a leading dot when subdomains match too.
    pub domain: String,
    /// Sent to subdomains of `domain`.
    pub include_subdomains: bool,
    /// Path prefix the cookie applies to.
    pub path: String,
    /// Only sent over https.
    pub secure: bool,
    /// Hidden from scripts.
    #[serde(default)]
    pub http_only: bool,
    /// Expiry as a unix timestamp, `None` for session cookies.
    #[serde(default)]
    pub expires: Option<i64>,
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

impl CookieEntry {
    fn host(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    /// The cookie as a `Set-Cookie` header value.
    #[must_use]
    pub fn set_cookie_header(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            header.push_str("; Domain=");
            header.push_str(self.host());
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }

    /// A URL the cookie could have been set by.
    #[must_use]
    pub fn origin_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}{}", self.host(), self.path)
    }
}

/// Parses the contents of a Netscape cookie jar.
pub fn parse_cookie_jar(text: &str) -> Result<Vec<CookieEntry>, ConfigurationError> {
    let mut cookies = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None => (line, false),
        };
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(ConfigurationError::new(format!(
                "line {}: expected 7 tab separated fields, found {}",
                number + 1,
                fields.len()
            )));
        };
        let expires = match expires.trim() {
            "" | "0" => None,
            raw => Some(raw.parse::<i64>().map_err(|_| {
                ConfigurationError::new(format!("line {}: invalid expiry '{raw}'", number + 1))
            })?),
        };
        cookies.push(CookieEntry {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("TRUE"),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            secure: secure.eq_ignore_ascii_case("TRUE"),
            http_only,
            expires,
            name: name.to_string(),
            value: value.to_string(),
        });
    }
    Ok(cookies)
}

/// Reads and parses the cookie jar at `path`.
pub async fn load_cookie_file(path: &Path) -> Result<Vec<CookieEntry>, ConfigurationError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        ConfigurationError::new(format!("failed to read cookie file '{}': {e}", path.display()))
    })?;
    let cookies = parse_cookie_jar(&text).map_err(|e| {
        ConfigurationError::new(format!("invalid cookie file '{}': {}", path.display(), e.message))
    })?;
    debug!(path = %path.display(), count = cookies.len(), "cookie file loaded");
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const JAR: &str = "# Netscape HTTP Cookie File\n\
        \n\
        .example.org\tTRUE\t/\tFALSE\t0\tsession\tabc\n\
        #HttpOnly_shop.example.org\tFALSE\t/cart\tTRUE\t1700000000\ttoken\tx=y\n";

    #[test]
    fn test_parse_cookie_jar() {
        let cookies = parse_cookie_jar(JAR).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "session");
        assert!(cookies[0].include_subdomains);
        assert_eq!(cookies[0].expires, None);
        assert!(cookies[1].http_only);
        assert!(cookies[1].secure);
        assert_eq!(cookies[1].value, "x=y");
        assert_eq!(cookies[1].expires, Some(1_700_000_000));
    }

    #[test]
    fn test_set_cookie_header() {
        let cookies = parse_cookie_jar(JAR).unwrap();
        assert_eq!(
            cookies[0].set_cookie_header(),
            "session=abc; Path=/; Domain=example.org"
        );
        assert_eq!(cookies[0].origin_url(), "http://example.org/");
        assert_eq!(
            cookies[1].set_cookie_header(),
            "token=x=y; Path=/cart; Secure; HttpOnly"
        );
        assert_eq!(cookies[1].origin_url(), "https://shop.example.org/cart");
    }

    #[test]
    fn test_malformed_line() {
        let err = parse_cookie_jar("example.org\tTRUE\t/\n").unwrap_err();
        assert!(err.message.contains("line 1"));
        assert!(parse_cookie_jar("a\tTRUE\t/\tFALSE\tsoon\tn\tv").is_err());
    }

    #[tokio::test]
    async fn test_load_cookie_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, JAR).unwrap();
        assert_eq!(load_cookie_file(&path).await.unwrap().len(), 2);
        let err = load_cookie_file(&dir.path().join("missing.txt")).await.unwrap_err();
        assert!(err.message.contains("failed to read cookie file"));
    }
}
