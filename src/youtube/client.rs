use std::cmp::min;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::youtube::models::{ChannelItem, ListResponse, PlaylistItem, VideoItem};

/// Platform-imposed ceiling on ids per batched request.
pub const MAX_IDS_PER_REQUEST: usize = 50;

#[derive(Error, Debug)]
pub enum YtError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("missing API credential")]
    MissingKey,
}

/// Batched-id lookup against the channels endpoint. The validation cache
/// and the daily pipeline depend on this seam rather than on the concrete
/// client.
#[async_trait]
pub trait ChannelLookup {
    async fn lookup_channels(&self, ids: &[String]) -> Result<Vec<ChannelItem>, YtError>;
}

/// Everything the monthly selector needs from the platform.
#[async_trait]
pub trait VideoSource: ChannelLookup {
    async fn playlist_video_ids(
        &self,
        playlist_id: &str,
        max_items: usize,
    ) -> Result<Vec<String>, YtError>;

    async fn lookup_videos(&self, ids: &[String]) -> Result<Vec<VideoItem>, YtError>;
}

/// Thin client over the YouTube Data v3 list endpoints.
///
/// Each request runs through one retry loop: transient failures (network,
/// 5xx, 429) back off exponentially up to `max_retries` attempts; definitive
/// client errors, including quota/forbidden responses, fail immediately.
pub struct YtClient {
    http: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl YtClient {
    pub fn new(cfg: &Config) -> Result<Self, YtError> {
        if cfg.api_key.trim().is_empty() {
            return Err(YtError::MissingKey);
        }
        let http = Client::builder()
            .user_agent("tubetrack/0.1")
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            max_retries: cfg.max_retries,
            backoff: Duration::from_millis(cfg.backoff_ms.max(1)),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, YtError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut attempt = 0u32;
        let max_attempts = self.max_retries.max(1);
        let mut delay = self.backoff;

        loop {
            attempt += 1;
            debug!(endpoint, attempt, "youtube request");
            let resp = match self
                .http
                .get(&url)
                .query(params)
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(endpoint, attempt, error = ?e, "youtube request network error");
                    if attempt >= max_attempts {
                        return Err(YtError::Net(e));
                    }
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                return Ok(resp.json::<T>().await?);
            }

            let code = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            let sample = body.get(..200).unwrap_or(&body);
            if code >= 500 || code == 429 {
                warn!(endpoint, attempt, status = code, sample_body = %sample, "youtube transient error");
                if attempt >= max_attempts {
                    return Err(YtError::Http { status: code, body });
                }
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                continue;
            }

            // Quota/forbidden and other 4xx cannot succeed within this run.
            if code == 401 || code == 403 {
                error!(endpoint, status = code, sample_body = %sample, "youtube auth/quota error, not retried");
            } else {
                warn!(endpoint, status = code, sample_body = %sample, "youtube client error, not retried");
            }
            return Err(YtError::Http { status: code, body });
        }
    }

    /// Fetch snippet/statistics/contentDetails for up to `MAX_IDS_PER_REQUEST`
    /// ids per call, concatenating results in chunk order. The platform may
    /// omit ids it does not know; callers diff against their input.
    pub async fn fetch_channels(&self, ids: &[String]) -> Result<Vec<ChannelItem>, YtError> {
        let mut all = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let joined = chunk.join(",");
            let page: ListResponse<ChannelItem> = self
                .get_json(
                    "channels",
                    &[
                        ("part", "snippet,statistics,contentDetails"),
                        ("id", joined.as_str()),
                        ("maxResults", "50"),
                    ],
                )
                .await?;
            all.extend(page.items);
        }
        Ok(all)
    }

    /// Fetch full detail for a set of video ids, chunked like `fetch_channels`.
    pub async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<VideoItem>, YtError> {
        let mut all = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let joined = chunk.join(",");
            let page: ListResponse<VideoItem> = self
                .get_json(
                    "videos",
                    &[
                        ("part", "snippet,contentDetails,statistics"),
                        ("id", joined.as_str()),
                        ("maxResults", "50"),
                    ],
                )
                .await?;
            all.extend(page.items);
        }
        Ok(all)
    }

    /// Page through a playlist collecting up to `max_items` video ids in the
    /// platform's native order (uploads playlists are reverse-chronological).
    pub async fn playlist_items(
        &self,
        playlist_id: &str,
        max_items: usize,
    ) -> Result<Vec<String>, YtError> {
        let mut video_ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        while video_ids.len() < max_items {
            let page_size = min(MAX_IDS_PER_REQUEST, max_items - video_ids.len()).to_string();
            let mut params = vec![
                ("part", "contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            let token;
            if let Some(t) = &page_token {
                token = t.clone();
                params.push(("pageToken", token.as_str()));
            }

            let page: ListResponse<PlaylistItem> = self.get_json("playlistItems", &params).await?;
            for item in page.items {
                if let Some(vid) = item.content_details.and_then(|cd| cd.video_id) {
                    if !vid.is_empty() {
                        video_ids.push(vid);
                    }
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        video_ids.truncate(max_items);
        Ok(video_ids)
    }
}

#[async_trait]
impl ChannelLookup for YtClient {
    async fn lookup_channels(&self, ids: &[String]) -> Result<Vec<ChannelItem>, YtError> {
        self.fetch_channels(ids).await
    }
}

#[async_trait]
impl VideoSource for YtClient {
    async fn playlist_video_ids(
        &self,
        playlist_id: &str,
        max_items: usize,
    ) -> Result<Vec<String>, YtError> {
        self.playlist_items(playlist_id, max_items).await
    }

    async fn lookup_videos(&self, ids: &[String]) -> Result<Vec<VideoItem>, YtError> {
        self.fetch_videos(ids).await
    }
}
