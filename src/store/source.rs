//! Where configuration comes from.
//!
//! The central authority's protocol is deliberately left open: a source only
//! has to produce bytes. HTTP and local-file sources are provided.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SourceConfig;

/// A fetch (or the validation of what was fetched) failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authority returned status {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration is empty")]
    Empty,

    #[error("configuration is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

impl FetchError {
    /// Transport failures and server errors are worth another attempt;
    /// bad content and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Http(_) | FetchError::Io(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::Empty | FetchError::TooLarge { .. } => false,
        }
    }
}

/// Fetches raw configuration bytes from the central authority.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// GET a URL; the response body is the configuration.
///
/// The body is read chunk by chunk and abandoned as soon as it passes
/// `max_bytes`.
pub struct HttpConfigSource {
    client: reqwest::Client,
    url: String,
    max_bytes: usize,
}

impl HttpConfigSource {
    pub fn new(url: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    size: usize::try_from(len).unwrap_or(usize::MAX),
                    limit: self.max_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    size: body.len() + chunk.len(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Read a file on the local filesystem.
pub struct FileConfigSource {
    path: PathBuf,
    max_bytes: usize,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let len = tokio::fs::metadata(&self.path).await?.len();
        if len > self.max_bytes as u64 {
            return Err(FetchError::TooLarge {
                size: usize::try_from(len).unwrap_or(usize::MAX),
                limit: self.max_bytes,
            });
        }
        Ok(tokio::fs::read(&self.path).await?)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Build the source named in the configuration. Bodies larger than
/// `max_bytes` are refused while being read.
pub fn from_config(config: &SourceConfig, max_bytes: usize) -> Arc<dyn ConfigSource> {
    match config {
        SourceConfig::Http { url } => Arc::new(HttpConfigSource::new(url.clone(), max_bytes)),
        SourceConfig::File { path } => Arc::new(FileConfigSource::new(path.clone(), max_bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        std::fs::write(&path, b"<config><port>4000</port></config>").unwrap();

        let source = from_config(&SourceConfig::File { path: path.clone() }, 1024);
        let data = source.fetch().await.unwrap();
        assert_eq!(data, b"<config><port>4000</port></config>");
        assert!(source.describe().ends_with("settings.xml"));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileConfigSource::new("/nonexistent/settings.xml", 1024);
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Empty.is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[tokio::test]
    async fn test_file_source_refuses_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        std::fs::write(&path, vec![b'x'; 100]).unwrap();

        let err = FileConfigSource::new(&path, 64).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { size: 100, limit: 64 }));
        assert!(!err.is_retryable());
    }

    /// Serve one response with no Content-Length, ending the body by closing.
    async fn serve_unsized_body(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
                .await;
            for chunk in body.chunks(16) {
                if socket.write_all(chunk).await.is_err() {
                    break;
                }
            }
            let _ = socket.shutdown().await;
        });
        format!("http://{}/config", addr)
    }

    #[tokio::test]
    async fn test_http_source_stops_reading_past_limit() {
        let url = serve_unsized_body(vec![b'x'; 4096]).await;
        let err = HttpConfigSource::new(url, 64).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 64, .. }));
    }

    #[tokio::test]
    async fn test_http_source_reads_body_within_limit() {
        let url = serve_unsized_body(b"<config>v1</config>".to_vec()).await;
        let data = HttpConfigSource::new(url, 64).fetch().await.unwrap();
        assert_eq!(data, b"<config>v1</config>");
    }
}
