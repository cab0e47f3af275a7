// Allow dead code: Infrastructure methods for future use
#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Request method. Only GET is ever served from cache; everything else
/// passes through to the network untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// How the request was initiated. Navigations are the only requests that
/// get the offline-document fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Standard,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub mode: RequestMode,
    pub accept: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            mode: RequestMode::Standard,
            accept: None,
            body: None,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            mode: RequestMode::Standard,
            accept: None,
            body: Some(body),
        }
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// A request is a navigation if it was initiated as one or if it
    /// declares it accepts an HTML document.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
            || self
                .accept
                .as_deref()
                .map(|a| a.contains("text/html"))
                .unwrap_or(false)
    }
}

/// A response as stored and replayed by the cache layer. Status and content
/// type are carried alongside the body so an offline replay is faithful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network collaborator. Any HTTP status is a successful fetch; only
/// transport failures (offline, DNS, timeout) error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("matchday/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(request.url.clone()));
        }

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self
                .client
                .post(&request.url)
                .body(request.body.clone().unwrap_or_default()),
        };
        if let Some(ref accept) = request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            content_type,
            body,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_detection_by_mode() {
        assert!(Request::navigate("http://localhost/").is_navigation());
        assert!(!Request::get("http://localhost/logo.png").is_navigation());
    }

    #[test]
    fn test_navigation_detection_by_accept_header() {
        let req = Request::get("http://localhost/page")
            .with_accept("text/html,application/xhtml+xml");
        assert!(req.is_navigation());

        let req = Request::get("http://localhost/data").with_accept("application/json");
        assert!(!req.is_navigation());
    }

    #[test]
    fn test_post_is_not_get() {
        let req = Request::post("http://localhost/api", b"payload".to_vec());
        assert_eq!(req.method, Method::Post);
        assert!(!req.is_navigation());
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_non_http_url() {
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch(&Request::get("ftp://example.com/file"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
