//! Text decoding of fetched bytes.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// Looks up an encoding label, falling back to UTF-8.
#[must_use]
pub fn lookup(label: &str) -> &'static Encoding {
    Encoding::for_label(label.trim().as_bytes()).unwrap_or(UTF_8)
}

/// Decodes `bytes` as `label`, replacing malformed sequences.
///
/// A byte order mark overrides the label.
#[must_use]
pub fn decode<'a>(bytes: &'a [u8], label: &str) -> Cow<'a, str> {
    let (text, _, _) = lookup(label).decode(bytes);
    text
}

/// Extracts the `charset` parameter of a `Content-Type` value or a data
/// URL media type.
#[must_use]
pub fn charset_param(media_type: &str) -> Option<String> {
    media_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_label() {
        assert_eq!(decode(b"caf\xe9", "windows-1252"), "café");
        assert_eq!(decode("café".as_bytes(), "utf-8"), "café");
        assert_eq!(decode(b"a\xffb", "utf-8"), "a\u{fffd}b");
    }

    #[test]
    fn test_unknown_label_falls_back() {
        assert_eq!(lookup("no-such-encoding"), UTF_8);
    }

    #[test]
    fn test_charset_param() {
        assert_eq!(
            charset_param("text/html; charset=\"ISO-8859-1\""),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(charset_param("text/plain;base64"), None);
        assert_eq!(charset_param("text/html"), None);
    }
}
