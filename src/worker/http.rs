//! HTTP client for downloading images

use crate::config::DownloadConfig;
use crate::humanize::ByteSize;
use crate::storage::ResponseMeta;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName};
use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Transport(String),

    #[error("HTTP {code}: {reason}")]
    Status { code: u16, reason: String },

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: ByteSize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout
        } else if e.is_builder() {
            DownloadError::InvalidRequest(e.to_string())
        } else if e.is_connect() || e.is_redirect() || e.is_request() {
            DownloadError::Transport(e.to_string())
        } else if e.is_body() || e.is_decode() {
            DownloadError::Body(e.to_string())
        } else {
            DownloadError::Unexpected(e.to_string())
        }
    }
}

/// A complete response body together with the headers used for naming
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub body: Bytes,
    pub meta: ResponseMeta,
}

/// Something that can perform one GET for an image
///
/// Implemented by [`HttpClient`]; tests substitute scripted sources.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_once(&self, url: &Url) -> Result<FetchedImage>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_image_bytes: ByteSize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig::from(&DownloadConfig::default())
    }
}

impl From<&DownloadConfig> for HttpConfig {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            max_image_bytes: config.max_image_bytes,
        }
    }
}

/// HTTP image downloader
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::InvalidRequest(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Read the body in chunks, stopping once it passes the size limit
    async fn read_limited(&self, mut response: Response) -> Result<Bytes> {
        let limit = self.config.max_image_bytes;

        if let Some(declared) = response.content_length() {
            if declared > limit.as_u64() {
                return Err(DownloadError::TooLarge {
                    size: declared,
                    limit,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit.as_u64() {
                return Err(DownloadError::TooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}

#[async_trait]
impl ImageSource for HttpClient {
    async fn fetch_once(&self, url: &Url) -> Result<FetchedImage> {
        debug!(%url, "Starting download");

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let meta = ResponseMeta {
            content_type: header_string(response.headers(), &CONTENT_TYPE),
            content_disposition: header_string(response.headers(), &CONTENT_DISPOSITION),
        };

        let body = self.read_limited(response).await?;

        debug!(%url, size = body.len(), "Download completed");

        Ok(FetchedImage { body, meta })
    }
}

fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_image_bytes, ByteSize(50 * 1024 * 1024));
        assert!(config.user_agent.starts_with("imagefetch/"));
    }

    #[test]
    fn test_http_config_from_download_config() {
        let download = DownloadConfig {
            request_timeout_ms: 1500,
            user_agent: "custom/1.0".to_string(),
            ..DownloadConfig::default()
        };
        let config = HttpConfig::from(&download);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.user_agent, "custom/1.0");
    }

    #[test]
    fn test_header_string_reads_present_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "image/png".parse().unwrap());
        assert_eq!(
            header_string(&headers, &CONTENT_TYPE).as_deref(),
            Some("image/png")
        );
        assert_eq!(header_string(&headers, &CONTENT_DISPOSITION), None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::new(HttpConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{}/a.png", addr)).unwrap();

        let result = client.fetch_once(&url).await;
        assert!(matches!(result, Err(DownloadError::Transport(_))));
    }
}
