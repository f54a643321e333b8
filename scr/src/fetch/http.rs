//! HTTP transport backed by `reqwest`.

use super::config::FetchConfig;
use super::{HttpClient, HttpResponse};
use crate::errors::{FetchError, FetchErrorKind};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// [`HttpClient`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
    max_response_size: usize,
}

impl ReqwestClient {
    /// Builds a client from `config`.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| FetchError::new(FetchErrorKind::InvalidLocation, key).with_message(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::new(FetchErrorKind::InvalidLocation, key).with_message(e.to_string()))?;
            headers.insert(name, value);
        }
        let jar = Jar::default();
        for cookie in &config.cookies {
            match Url::parse(&cookie.origin_url()) {
                Ok(origin) => jar.add_cookie_str(&cookie.set_cookie_header(), &origin),
                Err(e) => warn!(domain = %cookie.domain, name = %cookie.name, error = %e, "cookie skipped"),
            }
        }
        let mut builder = Client::builder()
            .cookie_provider(Arc::new(jar))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .default_headers(headers);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::transport("<client>", e.to_string()))?;
        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }

    fn map_error(url: &str, err: &reqwest::Error) -> FetchError {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_connect() {
            FetchErrorKind::Connection
        } else if err.is_builder() {
            FetchErrorKind::InvalidLocation
        } else if let Some(status) = err.status() {
            FetchErrorKind::Status(status.as_u16())
        } else {
            return FetchError::transport(url, err.to_string());
        };
        FetchError::new(kind, url)
    }
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::map_error(url, &e))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = header(response.headers(), CONTENT_TYPE);
        let content_disposition = header(response.headers(), CONTENT_DISPOSITION);
        if response
            .content_length()
            .is_some_and(|len| len > self.max_response_size as u64)
        {
            return Err(FetchError::transport(url, "response exceeds the size limit"));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(url, &e))?;
        debug!(url, status, bytes = bytes.len(), "http response");
        Ok(HttpResponse {
            status,
            bytes: bytes.to_vec(),
            content_type,
            content_disposition,
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::cookies::parse_cookie_jar;

    #[test]
    fn test_client_accepts_cookie_jar() {
        let cookies = parse_cookie_jar(".example.org\tTRUE\t/\tFALSE\t0\tsid\t1\n").unwrap();
        let config = FetchConfig::new().with_cookies(cookies);
        assert!(ReqwestClient::new(&config).is_ok());
    }
}
