//! HTTP client utilities.
//!
//! This module provides a simple blocking HTTP client wrapper with
//! sensible defaults for common operations. The whole engine is
//! synchronous, so the client is built on `reqwest::blocking`.

use crate::config::ProxySettings;
use crate::error::{ErrorContext, FoundationError, Result};
use std::time::Duration;

/// Blocking HTTP client with configurable timeout and proxy settings.
///
/// # Example
/// ```no_run
/// use hx_foundation::http::HttpClient;
///
/// # fn example() -> hx_foundation::Result<()> {
/// let client = HttpClient::new()?;
/// let doc: serde_json::Value = client.download_json("https://example.com/data.json")?;
/// # Ok(())
/// # }
/// ```
pub struct HttpClient {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

/// Builder for configuring an HttpClient.
pub struct HttpClientBuilder {
    timeout: Duration,
    headers: reqwest::header::HeaderMap,
    proxy: ProxySettings,
}

impl HttpClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            headers: reqwest::header::HeaderMap::new(),
            proxy: ProxySettings::default(),
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply proxy and certificate settings.
    pub fn proxy_settings(mut self, settings: ProxySettings) -> Self {
        self.proxy = settings;
        self
    }

    /// Add a custom header.
    pub fn header(mut self, key: reqwest::header::HeaderName, value: &str) -> Result<Self> {
        let value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
            FoundationError::InvalidInput(format!("Invalid header value for {key}: {e}"))
        })?;
        self.headers.insert(key, value);
        Ok(self)
    }

    /// Build the HttpClient.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers);

        if let Some(url) = &self.proxy.http_proxy {
            let proxy = reqwest::Proxy::http(url)
                .map_err(|e| FoundationError::Http(format!("Invalid HTTP proxy {url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(url) = &self.proxy.https_proxy {
            let proxy = reqwest::Proxy::https(url)
                .map_err(|e| FoundationError::Http(format!("Invalid HTTPS proxy {url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(path) = &self.proxy.ca_bundle {
            let pem = std::fs::read(path).with_context(|| format!("Reading CA bundle {path}"))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| FoundationError::Http(format!("Invalid CA bundle {path}: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| {
            FoundationError::Other(anyhow::anyhow!("Failed to build HTTP client: {e}"))
        })?;

        Ok(HttpClient {
            client,
            timeout: self.timeout,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default settings (30 second timeout)
    /// and proxy configuration taken from the environment.
    pub fn new() -> Result<Self> {
        HttpClientBuilder::new()
            .proxy_settings(ProxySettings::from_env())
            .build()
    }

    /// Create a builder for configuring an HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Get the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Download content from a URL as bytes.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| FoundationError::Http(format!("HTTP request failed for {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(FoundationError::Http(format!(
                "HTTP request to {url} failed with status: {}",
                response.status()
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FoundationError::Http(format!("Failed to read response body: {e}")))
    }

    /// Download content from a URL and parse it as JSON.
    pub fn download_json<T>(&self, url: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.download(url)?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        let client = HttpClientBuilder::new().build().unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_custom_timeout() {
        let client = HttpClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }
}
