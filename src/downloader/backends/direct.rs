use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::downloader::categories;
use crate::downloader::config::DownloaderConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::filename;
use crate::downloader::models::{Acquired, JobRequest};
use crate::downloader::traits::{DownloadStrategy, ProgressEmitter};
use crate::downloader::utils::format_bytes;

/// Plain HTTP(S) transfer of a single resource
pub struct DirectStrategy {
    client: Client,
    read_timeout: Duration,
}

impl DirectStrategy {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| DownloadError::Unexpected(format!("Invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            read_timeout: config.read_timeout,
        })
    }

    async fn discard(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("[direct] Failed to remove partial file {}: {}", path.display(), e);
        }
    }
}

/// Header value decoded lossily; servers do send raw UTF-8 or Latin-1 file names
fn header_lossy(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

#[async_trait]
impl DownloadStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn download(
        &self,
        request: &JobRequest,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<Acquired, DownloadError> {
        emitter.log(format!("📥 Connecting to {}", request.url)).await;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = tokio::time::timeout(self.read_timeout, self.client.get(&request.url).send()) => {
                match response {
                    Ok(response) => response.map_err(|e| DownloadError::Network(e.to_string()))?,
                    Err(_) => {
                        return Err(DownloadError::Network(format!(
                            "no response from server within {}s",
                            self.read_timeout.as_secs()
                        )))
                    }
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let name = filename::resolve(
            &request.url,
            header_lossy(response.headers(), header::CONTENT_DISPOSITION).as_deref(),
            header_lossy(response.headers(), header::CONTENT_TYPE).as_deref(),
            request.custom_name.as_deref(),
        );
        let category = categories::category_for(&name);
        let folder = request.destination_root.join(category.folder);
        tokio::fs::create_dir_all(&folder).await?;
        let path = filename::unique_path(&folder, &name);
        let saved_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(name);

        tracing::info!("[direct] {} -> {}", request.url, path.display());
        emitter.log(format!("📄 File: {}", saved_name)).await;
        emitter.log(format!("📁 Saving to: {}/", category.folder)).await;

        let total = response.content_length().filter(|t| *t > 0);
        if let Some(total) = total {
            emitter.log(format!("Size: {}", format_bytes(total))).await;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_percent: Option<u8> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drop(file);
                    Self::discard(&path).await;
                    tracing::info!("[direct] Cancelled, removed {}", path.display());
                    return Err(DownloadError::Cancelled);
                }
                next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    drop(file);
                    Self::discard(&path).await;
                    return Err(DownloadError::Network(e.to_string()));
                }
                Err(_) => {
                    drop(file);
                    Self::discard(&path).await;
                    return Err(DownloadError::Network(format!(
                        "no data received for {}s",
                        self.read_timeout.as_secs()
                    )));
                }
            };

            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                Self::discard(&path).await;
                return Err(e.into());
            }
            downloaded += chunk.len() as u64;

            if let Some(total) = total {
                let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    emitter.progress(percent).await;
                }
            }
        }

        if let Err(e) = file.flush().await {
            drop(file);
            Self::discard(&path).await;
            return Err(e.into());
        }

        tracing::info!("[direct] Saved {} ({})", path.display(), format_bytes(downloaded));

        Ok(Acquired {
            message: format!(
                "File downloaded successfully: {}\nSaved in: {}/",
                saved_name, category.folder
            ),
            path: Some(path),
        })
    }
}
