// NAR membership API client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::models::{to_scan_record, SearchRequest, SearchResponse};
use super::{CursorPagedSource, ScanPage};
use crate::ingest::config::NarConfig;
use crate::ingest::levels::LevelRemap;
use crate::ingest::models::ScanCursor;
use crate::ingest::{clip_error_body, Result, SyncError};

pub struct NarClient {
    client: Client,
    config: NarConfig,
    levels: LevelRemap,
}

impl NarClient {
    pub fn new(config: NarConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("certsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            levels: LevelRemap::default(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.config.base_url.trim_end_matches('/'))
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let response = self
            .client
            .post(self.search_url())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = clip_error_body(response.text().await.unwrap_or_default());
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SyncError::Unauthorized(format!("NAR rejected credentials ({})", status))
                },
                _ => SyncError::Upstream {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        Ok(response.json::<SearchResponse>().await?)
    }
}

#[async_trait]
impl CursorPagedSource for NarClient {
    async fn fetch_next_page(&self, cursor: &ScanCursor) -> Result<ScanPage> {
        let page = cursor.next_page();
        let request = SearchRequest::modified_since(
            cursor.query_watermark.modified_at,
            page,
            self.config.page_size,
        );
        debug!(page, filter = %request.filter, "Requesting NAR page");

        let response = self.search(&request).await?;

        let mut records = Vec::with_capacity(response.search_results.len());
        let mut dropped = 0;
        for fields in &response.search_results {
            match to_scan_record(fields, &self.levels) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    dropped += 1;
                    warn!(page, %reason, "Dropping malformed NAR record");
                },
            }
        }

        Ok(ScanPage {
            records,
            pagination: response.pagination.into(),
            total_results: response.pagination.total_results,
            dropped,
        })
    }
}
