//! Shared HTTP session
//!
//! One `reqwest::Client` is built per process and cloned into every consumer
//! (scanner, thumbnail writer, release resolver, asset fetcher) so they share
//! a single connection pool.

use crate::error::ChandlError;
use reqwest::header::ACCEPT;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default user agent; release hosts and the CDN accept any browser-like value
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout for API calls and small bodies
    pub timeout: Duration,
    /// Longest silence tolerated while a streamed body is arriving
    pub read_timeout: Duration,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Cheaply clonable handle to the shared session
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a client with default configuration
    pub fn new() -> Result<Self, ChandlError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a client with custom configuration.
    /// The total timeout is set per request so streamed downloads are only
    /// bounded by `read_timeout`.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, ChandlError> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET request with the common headers and the whole-request timeout
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .timeout(self.config.timeout)
            .header(ACCEPT, "*/*")
    }

    /// Send a GET whose body will be streamed; only the wait for the
    /// response head is bounded, by `read_timeout`
    pub async fn get_stream(&self, url: &str) -> Result<Response, ChandlError> {
        debug!("GET {} (stream)", url);
        let request = self.client.get(url).header(ACCEPT, "*/*").send();
        let response = tokio::time::timeout(self.config.read_timeout, request)
            .await
            .map_err(|_| {
                ChandlError::transfer(
                    url,
                    format!(
                        "no response within {}",
                        humantime::format_duration(self.config.read_timeout)
                    ),
                )
            })?
            .map_err(|e| ChandlError::transfer(url, e))?;
        ensure_success(url, response)
    }

    /// Send a GET and require a success status
    pub async fn get_ok(&self, url: &str) -> Result<Response, ChandlError> {
        debug!("GET {}", url);
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| ChandlError::transfer(url, e))?;
        ensure_success(url, response)
    }

    /// Fetch a whole body into memory
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ChandlError> {
        let response = self.get_ok(url).await?;
        response
            .bytes()
            .await
            .map(|body| body.to_vec())
            .map_err(|e| ChandlError::transfer(url, e))
    }

    /// Fetch and decode a JSON document with an explicit `Accept` value
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        accept: &str,
    ) -> Result<T, ChandlError> {
        debug!("GET {} (json)", url);
        let response = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| ChandlError::transfer(url, e))?;
        let response = ensure_success(url, response)?;
        Ok(response.json::<T>().await?)
    }
}

/// Map a non-success status to a transfer error
pub fn ensure_success(url: &str, response: Response) -> Result<Response, ChandlError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ChandlError::transfer(url, format!("HTTP {}", status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new().unwrap();
        assert_eq!(client.config().timeout, Duration::from_secs(60));
        assert_eq!(client.config().user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_client_with_config() {
        let config = HttpClientConfig {
            timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(2),
            user_agent: "chandl-test".to_string(),
        };
        let client = HttpClient::with_config(config).unwrap();
        assert_eq!(client.config().connect_timeout, Duration::from_secs(2));
        assert_eq!(client.config().read_timeout, Duration::from_secs(3));
        assert_eq!(client.config().user_agent, "chandl-test");
    }

    #[tokio::test]
    async fn test_get_bytes_success_and_failure() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/file")
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let body = client.get_bytes(&format!("{}/file", server.url())).await.unwrap();
        assert_eq!(&body[..], b"payload");

        let err = client
            .get_bytes(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(err.is_transfer_failure());
        assert!(err.to_string().contains("404"));

        ok.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_json_sends_accept() {
        #[derive(Deserialize)]
        struct Doc {
            name: String,
        }

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/doc")
            .match_header("accept", "application/vnd.github+json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"v1"}"#)
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let doc: Doc = client
            .get_json(&format!("{}/doc", server.url()), "application/vnd.github+json")
            .await
            .unwrap();
        assert_eq!(doc.name, "v1");
        mock.assert_async().await;
    }
}
