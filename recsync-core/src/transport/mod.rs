mod channel;

pub use channel::MessageChannel;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use url::Url;

use crate::config::{ConnectionSection, TransportSection};

/// Write-buffer size for streamed downloads.
pub const DOWNLOAD_CHUNK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("channel authentication rejected: {0}")]
    AuthFailed(String),
    #[error("socket exchange failed: {0}")]
    Socket(String),
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        TransportError::Http(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Socket(error.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Authenticated HTTP plus the stateful socket channel, all against one
/// upstream host.
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: Client,
    base_url: String,
    token: String,
    exchange_timeout: Duration,
}

impl TransportClient {
    pub fn new(
        connection: &ConnectionSection,
        transport: &TransportSection,
    ) -> TransportResult<Self> {
        let http = Client::builder()
            .user_agent("recsync/0.1")
            .timeout(Duration::from_secs(transport.request_timeout_secs))
            .build()
            .map_err(|err| TransportError::Http(err.to_string()))?;
        Ok(Self {
            http,
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            token: connection.access_token.clone(),
            exchange_timeout: Duration::from_secs(transport.exchange_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Joins a host-relative path onto the base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("file://")
        {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Direct byte-stream URL for an opaque content id.
    pub fn proxy_url(&self, content_id: &str) -> String {
        format!(
            "{}/api/media_source/proxy/{}",
            self.base_url,
            urlencoding::encode(content_id)
        )
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TransportResult<Value> {
        let url = self.absolute_url(path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    /// Cheap success check against a candidate byte-stream URL.
    pub async fn probe(&self, url: &str) -> TransportResult<bool> {
        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() == "file" {
                return Ok(parsed
                    .to_file_path()
                    .map(|path| path.exists())
                    .unwrap_or(false));
            }
        }
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        Ok(response.status().is_success())
    }

    /// Streams `url` to `dest`, staging into a sibling `.part` file so the
    /// previous asset survives a failed transfer intact.
    pub async fn download(&self, url: &str, dest: &Path) -> TransportResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| TransportError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let staging = dest.with_extension("part");
        if fs::try_exists(&staging).await.unwrap_or(false) {
            let _ = fs::remove_file(&staging).await;
        }

        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() == "file" {
                let source_path = parsed
                    .to_file_path()
                    .map_err(|_| TransportError::MalformedMessage("invalid file url".into()))?;
                fs::copy(&source_path, &staging)
                    .await
                    .map_err(|source| TransportError::Io {
                        path: staging.clone(),
                        source,
                    })?;
                return self.replace_dest(&staging, dest).await;
            }
        }

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let file = fs::File::create(&staging)
            .await
            .map_err(|source| TransportError::Io {
                path: staging.clone(),
                source,
            })?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            writer
                .write_all(&data)
                .await
                .map_err(|source| TransportError::Io {
                    path: staging.clone(),
                    source,
                })?;
        }
        writer
            .flush()
            .await
            .map_err(|source| TransportError::Io {
                path: staging.clone(),
                source,
            })?;
        self.replace_dest(&staging, dest).await
    }

    async fn replace_dest(&self, staging: &Path, dest: &Path) -> TransportResult<()> {
        if fs::try_exists(dest).await.unwrap_or(false) {
            fs::remove_file(dest)
                .await
                .map_err(|source| TransportError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
        }
        fs::rename(staging, dest)
            .await
            .map_err(|source| TransportError::Io {
                path: dest.to_path_buf(),
                source,
            })
    }

    /// Opens a fresh socket channel; callers close it on every exit path.
    pub async fn open_channel(&self) -> TransportResult<MessageChannel> {
        MessageChannel::connect(&websocket_url(&self.base_url), self.exchange_timeout).await
    }
}

fn websocket_url(base: &str) -> String {
    format!("{}/api/websocket", base.replacen("http", "ws", 1))
}
