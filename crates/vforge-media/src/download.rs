//! Streaming download of generated media.

use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Overall download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// HTTP client for fetching generated media from the provider's URLs.
#[derive(Debug, Clone)]
pub struct MediaDownloader {
    client: reqwest::Client,
}

impl MediaDownloader {
    pub fn new() -> MediaResult<Self> {
        // Provider URLs are slow to first byte; the generous timeout covers
        // the whole transfer, not just connection setup.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Stream `url` to `dest`, creating parent directories as needed.
    /// Returns the number of bytes written.
    pub async fn download_to(&self, url: &str, dest: impl AsRef<Path>) -> MediaResult<u64> {
        let dest = dest.as_ref();

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        debug!("Downloading {} -> {}", url, dest.display());

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MediaError::download_failed(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let mut file = fs::File::create(dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(MediaError::download_failed(format!("{} returned no data", url)));
        }

        info!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake video bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/clip.mp4");

        let downloader = MediaDownloader::new().unwrap();
        let written = downloader
            .download_to(&format!("{}/clip.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 16);
        assert_eq!(std::fs::read(&dest).unwrap(), b"fake video bytes");
    }

    #[tokio::test]
    async fn test_download_rejects_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = MediaDownloader::new().unwrap();
        let result = downloader
            .download_to(&format!("{}/missing.mp4", server.uri()), dir.path().join("x.mp4"))
            .await;

        assert!(matches!(result, Err(MediaError::DownloadFailed { .. })));
    }

    #[tokio::test]
    async fn test_download_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = MediaDownloader::new().unwrap();
        let result = downloader
            .download_to(&format!("{}/empty.mp4", server.uri()), dir.path().join("x.mp4"))
            .await;

        assert!(matches!(result, Err(MediaError::DownloadFailed { .. })));
    }
}
