use crate::error::CacheError;
use async_trait::async_trait;
use reqwest::Method;
use url::Url;

/// An outbound request as seen by the cache layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Top-level page navigation, eligible for the shell fallback.
    pub navigate: bool,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            navigate: false,
        }
    }

    pub fn navigation(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            navigate: true,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// A fully buffered response, storable as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// 2xx
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The live network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolves to any HTTP response, ok or not. Errors mean the network
    /// itself failed.
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_range() {
        assert!(Response::new("/", 200, "").is_ok());
        assert!(Response::new("/", 204, "").is_ok());
        assert!(!Response::new("/", 304, "").is_ok());
        assert!(!Response::new("/", 503, "").is_ok());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut response = Response::new("/", 200, "");
        response
            .headers
            .push(("Content-Type".to_string(), "text/html".to_string()));
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("etag"), None);
    }
}
