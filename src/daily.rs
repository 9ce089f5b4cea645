use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::cache::{CacheStatus, ValidationCache};
use crate::config::Config;
use crate::persist;
use crate::report::{ErrorKind, RunReport};
use crate::roster::{ReferenceTable, ReferenceUpdate};
use crate::validate::{validate, RejectReason};
use crate::youtube::client::{ChannelLookup, MAX_IDS_PER_REQUEST};
use crate::youtube::models::parse_count;

pub const DAILY_HEADER: [&str; 6] = [
    "date_utc",
    "channel_id",
    "channel_title",
    "subscribers",
    "views",
    "videos",
];

#[derive(Debug, Clone)]
pub struct DailyRow {
    pub date_utc: NaiveDate,
    pub channel_id: String,
    pub channel_title: String,
    pub subscribers: u64,
    pub views: u64,
    pub videos: u64,
}

impl DailyRow {
    fn to_row(&self) -> Vec<String> {
        vec![
            self.date_utc.to_string(),
            self.channel_id.clone(),
            self.channel_title.clone(),
            self.subscribers.to_string(),
            self.views.to_string(),
            self.videos.to_string(),
        ]
    }
}

/// Subject ids already carrying a DUPLICATE_ID record in the append-only
/// error table. Repeats are silenced the same way malformed ids are, so the
/// table does not grow by one row per run.
fn load_reported_duplicates(path: &Path) -> HashSet<String> {
    let mut ids = HashSet::new();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return ids,
    };
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());
    for record in rdr.records().flatten() {
        if record.get(3) == Some(ErrorKind::DuplicateId.as_str()) {
            if let Some(id) = record.get(2) {
                ids.insert(id.to_string());
            }
        }
    }
    ids
}

/// Load the (date_utc, channel_id) keys already present in the daily table.
/// A missing or unreadable file means no keys; this guard is best-effort, the
/// natural key is enforced here rather than by any storage constraint.
fn load_existing_keys(path: &Path) -> HashSet<(String, String)> {
    let mut keys = HashSet::new();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return keys,
    };
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());
    for record in rdr.records().flatten() {
        let date = record.get(0).unwrap_or("").to_string();
        let id = record.get(1).unwrap_or("").to_string();
        if !date.is_empty() && !id.is_empty() {
            keys.insert((date, id));
        }
    }
    keys
}

/// One scheduled daily run: validate the roster, resolve it through the
/// cache, fetch fresh statistics chunk by chunk, append deduplicated rows
/// and upsert the reference table. Per-chunk failures degrade that chunk
/// only.
pub async fn run<L: ChannelLookup>(cfg: &Config, client: &L) -> Result<()> {
    let now = Utc::now();
    let today = now.date_naive();
    info!(date = %today, "daily snapshot run starting");

    let mut reference = ReferenceTable::load(&cfg.reference_path())?;
    let mut report = RunReport::new(today.to_string());
    let mut cache = ValidationCache::load(&cfg.cache_path())?;

    let mut reported_duplicates = load_reported_duplicates(&cfg.daily_errors_path());
    let validation = validate(reference.roster());
    for (id, reason) in &validation.rejected {
        match reason {
            RejectReason::Duplicate => {
                if reported_duplicates.contains(id) {
                    debug!(channel = %id, "repeated identifier already reported");
                } else {
                    report.push(id.clone(), ErrorKind::DuplicateId, "repeated identifier in roster");
                    reported_duplicates.insert(id.clone());
                }
            }
            RejectReason::Format => {
                // Sticky: a malformed id is reported once, then silenced by
                // its cache entry on later runs.
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
        report.append_to(&cfg.daily_errors_path())?;
        bail!(
            "no syntactically valid channel ids in {}",
            cfg.reference_path().display()
        );
    }

    let confirmed = cache.resolve(&validation.valid, client, &mut report).await;
    cache.save(&cfg.cache_path())?;
    if confirmed.is_empty() {
        report.append_to(&cfg.daily_errors_path())?;
        bail!("no channel ids could be confirmed this run");
    }

    let existing = load_existing_keys(&cfg.daily_path());
    let mut fresh: Vec<DailyRow> = Vec::new();
    let mut skipped = 0usize;
    let total_chunks = confirmed.len().div_ceil(MAX_IDS_PER_REQUEST);
    for (idx, chunk) in confirmed.chunks(MAX_IDS_PER_REQUEST).enumerate() {
        info!(chunk = idx + 1, total_chunks, size = chunk.len(), "fetching channel statistics");
        let items = match client.lookup_channels(chunk).await {
            Ok(items) => items,
            Err(e) => {
                warn!(chunk = idx + 1, error = %e, "statistics chunk failed, continuing with the rest");
                for id in chunk {
                    report.push(id.clone(), ErrorKind::ApiError, e.to_string());
                }
                continue;
            }
        };

        for item in items {
            let snippet = item.snippet.clone().unwrap_or_default();
            let stats = item.statistics.clone().unwrap_or_default();
            let key = (today.to_string(), item.id.clone());
            if existing.contains(&key) {
                skipped += 1;
            } else {
                fresh.push(DailyRow {
                    date_utc: today,
                    channel_id: item.id.clone(),
                    channel_title: snippet.title.clone().unwrap_or_default(),
                    subscribers: parse_count(stats.subscriber_count.as_deref()),
                    views: parse_count(stats.view_count.as_deref()),
                    videos: parse_count(stats.video_count.as_deref()),
                });
            }
            reference.apply_update(ReferenceUpdate {
                channel_id: item.id.clone(),
                channel_title: snippet.title.unwrap_or_default(),
                custom_url: snippet.custom_url.unwrap_or_default(),
                country: snippet.country.unwrap_or_default(),
                channel_published_at: snippet.published_at.unwrap_or_default(),
                uploads_playlist_id: item.uploads_playlist_id().unwrap_or_default(),
                last_seen_utc: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            });
        }
    }

    if fresh.is_empty() {
        info!(skipped, "no new daily rows (already collected today?)");
    } else {
        persist::append_csv(&cfg.daily_path(), &DAILY_HEADER, fresh.iter().map(|r| r.to_row()))?;
        info!(rows = fresh.len(), skipped, "daily table updated");
    }

    reference.save(&cfg.reference_path())?;
    report.append_to(&cfg.daily_errors_path())?;
    info!(errors = report.records().len(), "daily snapshot run finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube::client::YtError;
    use crate::youtube::models::ChannelItem;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    const UC_A: &str = "UCaaaaaaaaaaaaaaaaaaaaaa";
    const UC_B: &str = "UCbbbbbbbbbbbbbbbbbbbbbb";
    const UC_C: &str = "UCcccccccccccccccccccccc";

    struct StubApi;

    #[async_trait]
    impl ChannelLookup for StubApi {
        async fn lookup_channels(&self, ids: &[String]) -> Result<Vec<ChannelItem>, YtError> {
            Ok(ids
                .iter()
                .map(|id| {
                    serde_json::from_str(&format!(
                        r#"{{
                            "id": "{id}",
                            "snippet": {{"title": "title-{id}", "country": "FR"}},
                            "statistics": {{"subscriberCount": "100", "viewCount": "2000", "videoCount": "30"}},
                            "contentDetails": {{"relatedPlaylists": {{"uploads": "UU{body}"}}}}
                        }}"#,
                        body = &id[2..]
                    ))
                    .unwrap()
                })
                .collect())
        }
    }

    static SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_config() -> Config {
        let n = SEQ.fetch_add(1, Ordering::SeqCst);
        let dir: PathBuf = std::env::temp_dir().join(format!(
            "tubetrack_daily_{}_{n}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        Config::for_dir(&dir, "test-key")
    }

    fn write_reference(cfg: &Config, body: &str) {
        fs::write(cfg.reference_path(), body).unwrap();
    }

    fn non_header_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .map(|t| t.lines().skip(1).map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn second_run_same_day_appends_nothing() {
        let cfg = temp_config();
        write_reference(
            &cfg,
            &format!("channel_id,notes\n{UC_A},a\n{UC_B},b\n{UC_C},c\nXYZ123,typo\n"),
        );

        run(&cfg, &StubApi).await.unwrap();
        assert_eq!(non_header_lines(&cfg.daily_path()).len(), 3);

        run(&cfg, &StubApi).await.unwrap();
        assert_eq!(non_header_lines(&cfg.daily_path()).len(), 3);
    }

    #[tokio::test]
    async fn malformed_id_is_reported_exactly_once_across_runs() {
        let cfg = temp_config();
        write_reference(&cfg, &format!("channel_id\n{UC_A}\nXYZ123\n"));

        run(&cfg, &StubApi).await.unwrap();
        run(&cfg, &StubApi).await.unwrap();

        let errors = non_header_lines(&cfg.daily_errors_path());
        let format_invalid: Vec<&String> = errors
            .iter()
            .filter(|l| l.contains("FORMAT_INVALID"))
            .collect();
        assert_eq!(format_invalid.len(), 1);
        assert!(format_invalid[0].contains("XYZ123"));
    }

    #[tokio::test]
    async fn duplicate_id_is_reported_exactly_once_across_runs() {
        let cfg = temp_config();
        // triple occurrence: two repeats inside one run
        let body = format!("channel_id\n{UC_A}\n{UC_A}\n{UC_A}\n");
        write_reference(&cfg, &body);
        run(&cfg, &StubApi).await.unwrap();

        // the rewrite collapses the repeats; put them back, as a hand edit would
        write_reference(&cfg, &body);
        run(&cfg, &StubApi).await.unwrap();

        let errors = non_header_lines(&cfg.daily_errors_path());
        let duplicates: Vec<&String> = errors
            .iter()
            .filter(|l| l.contains("DUPLICATE_ID"))
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert!(duplicates[0].contains(UC_A));
    }

    #[tokio::test]
    async fn reference_is_upserted_with_manual_fields_intact() {
        let cfg = temp_config();
        write_reference(&cfg, &format!("channel_id,channel_title,notes\n{UC_A},Stale,hand written\n"));

        run(&cfg, &StubApi).await.unwrap();

        let table = ReferenceTable::load(&cfg.reference_path()).unwrap();
        let a = table.get(UC_A).unwrap();
        assert_eq!(a.channel_title, format!("title-{UC_A}"));
        assert_eq!(a.country, "FR");
        assert_eq!(a.uploads_playlist_id, format!("UU{}", &UC_A[2..]));
        assert!(!a.last_seen_utc.is_empty());
        assert_eq!(a.manual.get("notes").map(String::as_str), Some("hand written"));
    }

    #[tokio::test]
    async fn run_without_any_valid_id_is_fatal() {
        let cfg = temp_config();
        write_reference(&cfg, "channel_id\nXYZ123\n");
        assert!(run(&cfg, &StubApi).await.is_err());
    }

    #[tokio::test]
    async fn missing_reference_file_is_fatal() {
        let cfg = temp_config();
        assert!(run(&cfg, &StubApi).await.is_err());
    }
}
