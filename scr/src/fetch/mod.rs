//! Document and content link retrieval.
//!
//! [`DocumentFetcher`] turns a [`FetchRequest`] into bytes: files are read
//! with `tokio::fs`, `data:` URLs are decoded inline, literal documents
//! are returned as they are and everything else goes through an
//! [`HttpClient`]. [`FetchPool`] bounds how many fetches run at once.

pub mod config;
pub mod cookies;
pub mod encoding;
#[cfg(feature = "http")]
pub mod http;
pub mod pool;

pub use config::FetchConfig;
pub use cookies::{load_cookie_file, CookieEntry};
#[cfg(feature = "http")]
pub use http::ReqwestClient;
pub use pool::{FetchPool, FetchTicket};

use crate::document::{Document, DocumentKind};
use crate::errors::{FetchError, FetchErrorKind};
use async_trait::async_trait;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// How to interpret `location`.
    pub kind: DocumentKind,
    /// Path, URL or literal text.
    pub location: String,
    /// Content of literal documents.
    pub literal: Option<String>,
}

impl FetchRequest {
    /// The request retrieving `doc`.
    #[must_use]
    pub fn for_document(doc: &Document) -> Self {
        Self {
            kind: doc.kind,
            location: doc.location.clone(),
            literal: doc.literal.clone(),
        }
    }

    /// A request for a content link.
    #[must_use]
    pub fn link(kind: DocumentKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            literal: None,
        }
    }
}

/// The result of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedDocument {
    /// Raw content.
    pub bytes: Vec<u8>,
    /// Encoding declared by the source, if any.
    pub declared_encoding: Option<String>,
    /// Location after redirects.
    pub final_location: String,
    /// Suggested filename.
    pub filename: Option<String>,
}

/// Retrieves documents.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    /// Fetches `request`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedDocument, FetchError>;
}

/// A raw HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body.
    pub bytes: Vec<u8>,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// `Content-Disposition` header.
    pub content_disposition: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

/// Performs HTTP GET requests.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// Requests `url`.
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// The shipped [`Fetcher`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFetcher {
    http: Option<Arc<dyn HttpClient>>,
}

impl DocumentFetcher {
    /// Creates a fetcher. Without an HTTP client only files, `data:`
    /// URLs and literals can be fetched.
    #[must_use]
    pub fn new(http: Option<Arc<dyn HttpClient>>) -> Self {
        Self { http }
    }

    /// Creates a fetcher with a `reqwest` client built from `config`.
    #[cfg(feature = "http")]
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self::new(Some(Arc::new(ReqwestClient::new(config)?))))
    }

    async fn read_file(path: &Path, location: &str) -> Result<FetchedDocument, FetchError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::not_found(location),
            _ => FetchError::new(FetchErrorKind::Io, location).with_message(e.to_string()),
        })?;
        Ok(FetchedDocument {
            bytes,
            declared_encoding: None,
            final_location: location.to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        })
    }

    async fn fetch_http(&self, location: &str) -> Result<FetchedDocument, FetchError> {
        let Some(ref http) = self.http else {
            return Err(FetchError::new(FetchErrorKind::InvalidLocation, location)
                .with_message("http support is not available"));
        };
        let response = http.get(location).await?;
        if response.status >= 400 {
            return Err(FetchError::new(FetchErrorKind::Status(response.status), location));
        }
        let filename = response
            .content_disposition
            .as_deref()
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(&response.final_url));
        Ok(FetchedDocument {
            bytes: response.bytes,
            declared_encoding: response.content_type.as_deref().and_then(encoding::charset_param),
            final_location: response.final_url,
            filename,
        })
    }
}

#[async_trait]
impl Fetcher for DocumentFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedDocument, FetchError> {
        let location = request.location.as_str();
        if let Some(ref literal) = request.literal {
            return Ok(FetchedDocument {
                bytes: literal.clone().into_bytes(),
                declared_encoding: None,
                final_location: location.to_string(),
                filename: None,
            });
        }
        if location.starts_with("data:") {
            return decode_data_url(location);
        }
        match request.kind {
            DocumentKind::File | DocumentKind::RFile => {
                Self::read_file(&file_path(location)?, location).await
            }
            _ if location.starts_with("file:") => {
                Self::read_file(&file_path(location)?, location).await
            }
            _ => self.fetch_http(location).await,
        }
    }
}

fn file_path(location: &str) -> Result<PathBuf, FetchError> {
    if !location.starts_with("file:") {
        return Ok(PathBuf::from(location));
    }
    Url::parse(location)
        .ok()
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| FetchError::new(FetchErrorKind::InvalidLocation, location))
}

/// Decodes a `data:[<media type>][;base64],<data>` URL.
pub fn decode_data_url(location: &str) -> Result<FetchedDocument, FetchError> {
    let invalid = || FetchError::new(FetchErrorKind::InvalidLocation, location);
    let rest = location.strip_prefix("data:").ok_or_else(invalid)?;
    let (meta, data) = rest.split_once(',').ok_or_else(invalid)?;
    let raw: Vec<u8> = percent_decode_str(data).collect();
    let bytes = if meta.ends_with(";base64") {
        let compact: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| invalid().with_message(format!("invalid base64 ({e})")))?
    } else {
        raw
    };
    Ok(FetchedDocument {
        bytes,
        declared_encoding: encoding::charset_param(&format!("x;{meta}")),
        final_location: location.to_string(),
        filename: None,
    })
}

/// Extracts the filename of a `Content-Disposition` header.
#[must_use]
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        let Some((key, val)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = val.trim().rsplit("''").next().unwrap_or_default();
                let decoded = percent_decode_str(encoded).decode_utf8_lossy().into_owned();
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
            "filename" => plain = Some(val.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }
    plain.filter(|f| !f.is_empty())
}

/// The last non-empty path segment of a URL.
#[must_use]
pub fn filename_from_url(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::StaticHttpClient;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[tokio::test]
    async fn test_literal_documents() {
        let doc = Document::initial(DocumentKind::Str, "<p>x</p>", [0].into());
        let fetched = DocumentFetcher::default()
            .fetch(&FetchRequest::for_document(&doc))
            .await
            .unwrap();
        assert_eq!(fetched.bytes, b"<p>x</p>");
    }

    #[tokio::test]
    async fn test_file_documents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let location = file.path().to_string_lossy().into_owned();

        let fetcher = DocumentFetcher::default();
        let fetched = fetcher
            .fetch(&FetchRequest::link(DocumentKind::File, location.clone()))
            .await
            .unwrap();
        assert_eq!(fetched.bytes, b"hello");
        assert!(fetched.filename.is_some());

        let err = fetcher
            .fetch(&FetchRequest::link(DocumentKind::File, format!("{location}.missing")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotFound);
    }

    #[test]
    fn test_data_urls() {
        let doc = decode_data_url("data:text/plain;charset=latin1;base64,aGk=").unwrap();
        assert_eq!(doc.bytes, b"hi");
        assert_eq!(doc.declared_encoding.as_deref(), Some("latin1"));

        let doc = decode_data_url("data:,a%20b").unwrap();
        assert_eq!(doc.bytes, b"a b");

        assert!(decode_data_url("data:;base64,!!").is_err());
        assert!(decode_data_url("data:nocomma").is_err());
    }

    #[tokio::test]
    async fn test_http_documents() {
        let http = StaticHttpClient::new()
            .with_page("https://a.org/files/report.pdf", 200, b"%PDF")
            .with_page("https://a.org/gone", 404, b"");
        let fetcher = DocumentFetcher::new(Some(Arc::new(http)));

        let fetched = fetcher
            .fetch(&FetchRequest::link(DocumentKind::Url, "https://a.org/files/report.pdf"))
            .await
            .unwrap();
        assert_eq!(fetched.filename.as_deref(), Some("report.pdf"));

        let err = fetcher
            .fetch(&FetchRequest::link(DocumentKind::Url, "https://a.org/gone"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Status(404));
    }

    #[tokio::test]
    async fn test_http_without_client() {
        let err = DocumentFetcher::default()
            .fetch(&FetchRequest::link(DocumentKind::Url, "https://a.org/"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::InvalidLocation);
    }

    #[test]
    fn test_filenames() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"a b.txt\""),
            Some("a b.txt".to_string())
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=x; filename*=UTF-8''%C3%A9.txt"),
            Some("é.txt".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
        assert_eq!(filename_from_url("https://a.org/x/img%201.png?q=1"), Some("img 1.png".to_string()));
        assert_eq!(filename_from_url("https://a.org/"), None);
    }
}
