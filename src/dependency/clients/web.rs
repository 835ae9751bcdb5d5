//! HTTP transport used by every dependency source

use std::path::Path;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Default User-Agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "depwatch";

/// Default request timeout (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Request headers as ordered name/value pairs
pub type Headers = Vec<(String, String)>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("got unsuccessful response from {url}: status {status}, body: {body}")]
    UnsuccessfulResponse {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// HTTP status of an unsuccessful response, if this error is one
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::UnsuccessfulResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait WebClient: Send + Sync {
    /// Fetches `url` and returns the response body
    async fn get(&self, url: &str, headers: &Headers) -> Result<Vec<u8>, TransportError>;

    /// Posts `body` to `url` and returns the response body
    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<Vec<u8>, TransportError>;

    /// Streams the body of `url` into the file at `path`
    async fn download(&self, url: &str, path: &Path, headers: &Headers)
    -> Result<(), TransportError>;
}

/// `WebClient` backed by a shared `reqwest::Client`
pub struct ReqwestWebClient {
    client: reqwest::Client,
}

impl ReqwestWebClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        headers: &Headers,
    ) -> Result<reqwest::Response, TransportError> {
        let request = headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name, value));

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            warn!("{} returned status {}", url, status);
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::UnsuccessfulResponse {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

impl Default for ReqwestWebClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }
}

#[async_trait::async_trait]
impl WebClient for ReqwestWebClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Vec<u8>, TransportError> {
        debug!("GET {}", url);
        let response = self.send(self.client.get(url), url, headers).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<Vec<u8>, TransportError> {
        debug!("POST {}", url);
        let request = self.client.post(url).body(body.to_vec());
        let response = self.send(request, url, headers).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn download(
        &self,
        url: &str,
        path: &Path,
        headers: &Headers,
    ) -> Result<(), TransportError> {
        debug!("downloading {} to {}", url, path.display());
        let mut response = self.send(self.client.get(url), url, headers).await?;

        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
