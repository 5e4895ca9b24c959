// TRA snapshot downloader

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::info;

use super::{Snapshot, SnapshotParser, SnapshotSource};
use crate::ingest::config::TraConfig;
use crate::ingest::{clip_error_body, Result, SyncError};

pub struct TraClient {
    client: Client,
    config: TraConfig,
    parser: SnapshotParser,
}

impl TraClient {
    pub fn new(config: TraConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("certsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let parser = SnapshotParser::new(config.delimiter, config.level_map.clone());

        Ok(Self {
            client,
            config,
            parser,
        })
    }

    async fn download(&self) -> Result<String> {
        let response = self.client.get(&self.config.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = clip_error_body(response.text().await.unwrap_or_default());
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SyncError::Unauthorized(format!("TRA refused the download ({})", status))
                },
                _ => SyncError::Upstream {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SnapshotSource for TraClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        info!(url = %self.config.url, "Downloading TRA snapshot");
        let content = self.download().await?;
        info!("Downloaded TRA snapshot: {} bytes ({} KB)", content.len(), content.len() / 1024);

        self.parser.parse(&content)
    }
}
