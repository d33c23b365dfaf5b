//! Requesting-application manifest fetch.

use super::request::AppPreview;
use crate::core::keys::DEFAULT_MANIFEST_TIMEOUT;
use crate::core::sanitize::{sanitize, sanitize_url};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Largest manifest body read from a requester-controlled URL.
pub const MAX_MANIFEST_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icon_url: String,
}

impl AppManifest {
    pub fn preview(&self) -> AppPreview {
        AppPreview {
            name: sanitize(&self.name),
            url: sanitize_url(&self.url),
            icon_url: sanitize_url(&self.icon_url),
        }
    }
}

#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<AppManifest>;
}

pub struct HttpManifestFetcher {
    client: reqwest::Client,
}

impl Default for HttpManifestFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_TIMEOUT)
    }
}

impl HttpManifestFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<AppManifest> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("manifest fetch returned {}", response.status());
        }
        let body = read_capped(response, MAX_MANIFEST_BYTES).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn read_capped(mut response: reqwest::Response, cap: usize) -> anyhow::Result<Vec<u8>> {
    if response.content_length().is_some_and(|len| len > cap as u64) {
        anyhow::bail!("manifest larger than {cap} bytes");
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > cap {
            anyhow::bail!("manifest larger than {cap} bytes");
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// One-shot HTTP server answering with `body`, without a Content-Length.
    async fn serve_once(body: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n";
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(body.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{addr}/tonconnect-manifest.json")
    }

    #[tokio::test]
    async fn fetches_small_manifest() {
        let url = serve_once(r#"{"name":"Hive","url":"https://hive.example","iconUrl":""}"#.to_string()).await;
        let manifest = HttpManifestFetcher::default().fetch(&url).await.unwrap();
        assert_eq!(manifest.name, "Hive");
        assert_eq!(manifest.url, "https://hive.example");
    }

    #[tokio::test]
    async fn oversized_manifest_is_refused() {
        let padding = " ".repeat(MAX_MANIFEST_BYTES);
        let url = serve_once(format!(r#"{{"name":"Hive"{padding}}}"#)).await;
        let err = HttpManifestFetcher::default().fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("larger than"), "{err}");
    }

    #[test]
    fn preview_is_sanitized() {
        let manifest: AppManifest = serde_json::from_str(
            r#"{"name":"<b>Bee</b>Swap","url":"javascript:alert(1)","iconUrl":"https://bee.example/icon.png"}"#,
        )
        .unwrap();
        let preview = manifest.preview();
        assert_eq!(preview.name, "BeeSwap");
        assert_eq!(preview.url, "");
        assert_eq!(preview.icon_url, "https://bee.example/icon.png");
    }

    #[test]
    fn missing_fields_default_empty() {
        let manifest: AppManifest = serde_json::from_str("{}").unwrap();
        assert_eq!(manifest.preview(), AppPreview::default());
    }
}
