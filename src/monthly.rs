use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use chrono::{DateTime, Months, Utc};
use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheStatus, ValidationCache};
use crate::config::Config;
use crate::persist;
use crate::report::{ErrorKind, RunReport};
use crate::roster::ReferenceTable;
use crate::validate::{validate, RejectReason};
use crate::youtube::client::{VideoSource, YtError, MAX_IDS_PER_REQUEST};
use crate::youtube::models::{parse_count, ChannelItem, VideoItem};

pub const MONTHLY_HEADER: [&str; 12] = [
    "snapshot_month",
    "snapshot_utc",
    "channel_id",
    "channel_title",
    "video_id",
    "published_at",
    "title",
    "duration_iso8601",
    "category_id",
    "view_count",
    "like_count",
    "comment_count",
];

/// One pool entry, recomputed from scratch every run. Never persisted between
/// runs except as emitted snapshot rows.
#[derive(Debug, Clone)]
pub struct VideoCandidate {
    pub video_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub published_at_raw: String,
    pub duration: String,
    pub category_id: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
}

impl VideoCandidate {
    fn from_item(item: &VideoItem) -> Self {
        let snippet = item.snippet.clone().unwrap_or_default();
        let details = item.content_details.clone().unwrap_or_default();
        let stats = item.statistics.clone().unwrap_or_default();
        let published_raw = snippet.published_at.clone().unwrap_or_default();
        Self {
            video_id: item.id.clone(),
            title: snippet.title.unwrap_or_default(),
            published_at: DateTime::parse_from_rfc3339(&published_raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            published_at_raw: published_raw,
            duration: details.duration.unwrap_or_default(),
            category_id: snippet.category_id.unwrap_or_default(),
            view_count: parse_count(stats.view_count.as_deref()),
            like_count: parse_count(stats.like_count.as_deref()),
            comment_count: parse_count(stats.comment_count.as_deref()),
        }
    }
}

/// Pick the snapshot set from a pool held in native (reverse-chronological)
/// order. Returns indexes into `pool` in first-seen union order: the
/// `recent_n` head first, then the top-viewed in-window candidates not
/// already included. The view-count sort is stable, so ties keep
/// candidate-discovery order.
pub fn select_videos(
    pool: &[VideoCandidate],
    cutoff: DateTime<Utc>,
    recent_n: usize,
    top_n: usize,
) -> Vec<usize> {
    let mut top: Vec<usize> = (0..pool.len())
        .filter(|&i| pool[i].published_at.is_some_and(|p| p >= cutoff))
        .collect();
    top.sort_by(|&a, &b| pool[b].view_count.cmp(&pool[a].view_count));
    top.truncate(top_n);

    let mut selected: IndexSet<usize> = IndexSet::new();
    selected.extend(0..pool.len().min(recent_n));
    selected.extend(top);
    selected.into_iter().collect()
}

fn is_uploads_id(id: &str) -> bool {
    id.len() == 24
        && id.starts_with("UU")
        && id[2..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

struct ChannelFailure {
    kind: ErrorKind,
    message: String,
}

impl ChannelFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<YtError> for ChannelFailure {
    fn from(e: YtError) -> Self {
        Self::new(ErrorKind::ApiError, e.to_string())
    }
}

struct ChannelSnapshot {
    channel_title: String,
    pool: Vec<VideoCandidate>,
    picks: Vec<usize>,
}

/// The per-channel state machine (§ resolve uploads -> pool -> detail ->
/// select). Every terminal failure is a value; the caller records it and
/// moves on to the next channel.
async fn snapshot_channel<S: VideoSource>(
    client: &S,
    channel_id: &str,
    reference: &ReferenceTable,
    fallback: &HashMap<String, ChannelItem>,
    fallback_failed: &HashSet<String>,
    cfg: &Config,
    cutoff: DateTime<Utc>,
) -> Result<ChannelSnapshot, ChannelFailure> {
    let cached = reference.get(channel_id);
    let cached_uploads = cached
        .map(|r| r.uploads_playlist_id.as_str())
        .unwrap_or_default();

    let uploads_id = if is_uploads_id(cached_uploads) {
        cached_uploads.to_string()
    } else if let Some(item) = fallback.get(channel_id) {
        match item.uploads_playlist_id() {
            Some(id) if is_uploads_id(&id) => id,
            Some(id) => {
                return Err(ChannelFailure::new(
                    ErrorKind::UploadsInvalid,
                    format!("unusable uploads playlist reference {id:?}"),
                ))
            }
            None => {
                return Err(ChannelFailure::new(
                    ErrorKind::UploadsMissing,
                    "channel has no uploads playlist reference",
                ))
            }
        }
    } else if fallback_failed.contains(channel_id) {
        return Err(ChannelFailure::new(
            ErrorKind::ApiError,
            "uploads lookup failed after retries",
        ));
    } else {
        return Err(ChannelFailure::new(
            ErrorKind::NotFound,
            "channel not returned by the platform",
        ));
    };

    let channel_title = fallback
        .get(channel_id)
        .map(|item| item.title())
        .filter(|t| !t.is_empty())
        .or_else(|| cached.map(|r| r.channel_title.clone()))
        .unwrap_or_default();

    let pool_ids = client
        .playlist_video_ids(&uploads_id, cfg.pool_size)
        .await?;
    if pool_ids.is_empty() {
        return Err(ChannelFailure::new(
            ErrorKind::EmptyUploads,
            "uploads playlist has no items",
        ));
    }

    let detail = client.lookup_videos(&pool_ids).await?;
    let by_id: HashMap<&str, &VideoItem> =
        detail.iter().map(|v| (v.id.as_str(), v)).collect();
    // Keep pool order (the playlist's), not the detail response's.
    let pool: Vec<VideoCandidate> = pool_ids
        .iter()
        .filter_map(|vid| by_id.get(vid.as_str()).map(|v| VideoCandidate::from_item(v)))
        .collect();
    if pool.is_empty() {
        return Err(ChannelFailure::new(
            ErrorKind::NoVideos,
            "no video detail returned for the uploads pool",
        ));
    }

    let picks = select_videos(&pool, cutoff, cfg.recent_n, cfg.top_n);
    Ok(ChannelSnapshot {
        channel_title,
        pool,
        picks,
    })
}

/// One monthly snapshot run. The period's data and error files are rewritten
/// wholesale; a channel's failure degrades output for that channel only.
pub async fn run<S: VideoSource>(cfg: &Config, client: &S) -> Result<()> {
    let now = Utc::now();
    let month = now.format("%Y-%m").to_string();
    let snapshot_utc = now.format("%Y-%m-%dT%H:%M:%S%z").to_string();
    let cutoff = now
        .checked_sub_months(Months::new(cfg.top_window_months))
        .unwrap_or(now);
    info!(month = %month, "monthly video snapshot starting");

    let reference = ReferenceTable::load(&cfg.reference_path())?;
    let mut report = RunReport::new(month.clone());
    let mut cache = ValidationCache::load(&cfg.cache_path())?;

    let validation = validate(reference.roster());
    for (id, reason) in &validation.rejected {
        match reason {
            RejectReason::Duplicate => {
                report.push(id.clone(), ErrorKind::DuplicateId, "repeated identifier in roster");
            }
            RejectReason::Format => {
                if cache.status_of(id) == Some(CacheStatus::Invalid) {
                    debug!(channel = %id, "skipping id cached as invalid");
                } else {
                    report.push(id.clone(), ErrorKind::FormatInvalid, "identifier fails syntax check");
                    cache.record_invalid([id.as_str()]);
                }
            }
        }
    }

    if validation.valid.is_empty() {
        cache.save(&cfg.cache_path())?;
        report.write_period_file(&cfg.monthly_errors_path(&month))?;
        bail!(
            "no syntactically valid channel ids in {}",
            cfg.reference_path().display()
        );
    }

    let confirmed = cache.resolve(&validation.valid, client, &mut report).await;
    cache.save(&cfg.cache_path())?;
    if confirmed.is_empty() {
        report.write_period_file(&cfg.monthly_errors_path(&month))?;
        bail!("no channel ids could be confirmed this run");
    }

    // Channels whose reference row lacks a usable uploads id fall back to one
    // batched channels lookup, caught per chunk.
    let needs_fallback: Vec<String> = confirmed
        .iter()
        .filter(|id| {
            !reference
                .get(id)
                .map(|r| is_uploads_id(&r.uploads_playlist_id))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    let mut fallback: HashMap<String, ChannelItem> = HashMap::new();
    let mut fallback_failed: HashSet<String> = HashSet::new();
    for chunk in needs_fallback.chunks(MAX_IDS_PER_REQUEST) {
        match client.lookup_channels(chunk).await {
            Ok(items) => {
                fallback.extend(items.into_iter().map(|item| (item.id.clone(), item)));
            }
            Err(e) => {
                warn!(batch_size = chunk.len(), error = %e, "uploads fallback lookup failed");
                fallback_failed.extend(chunk.iter().cloned());
            }
        }
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut channels_ok = 0usize;
    for channel_id in &confirmed {
        match snapshot_channel(
            client,
            channel_id,
            &reference,
            &fallback,
            &fallback_failed,
            cfg,
            cutoff,
        )
        .await
        {
            Ok(snapshot) => {
                info!(
                    channel = %channel_id,
                    pool = snapshot.pool.len(),
                    selected = snapshot.picks.len(),
                    "channel snapshot complete"
                );
                channels_ok += 1;
                for i in snapshot.picks {
                    let v = &snapshot.pool[i];
                    rows.push(vec![
                        month.clone(),
                        snapshot_utc.clone(),
                        channel_id.clone(),
                        snapshot.channel_title.clone(),
                        v.video_id.clone(),
                        v.published_at_raw.clone(),
                        v.title.clone(),
                        v.duration.clone(),
                        v.category_id.clone(),
                        v.view_count.to_string(),
                        v.like_count.to_string(),
                        v.comment_count.to_string(),
                    ]);
                }
            }
            Err(failure) => {
                report.push(channel_id.clone(), failure.kind, failure.message);
            }
        }
    }

    let row_count = rows.len();
    persist::atomic_write_csv(&cfg.monthly_path(&month), &MONTHLY_HEADER, rows)?;
    report.write_period_file(&cfg.monthly_errors_path(&month))?;
    info!(
        rows = row_count,
        channels_ok,
        errors = report.records().len(),
        "monthly video snapshot finished"
    );
    Ok(())
}
