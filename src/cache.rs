use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::persist;
use crate::report::{ErrorKind, RunReport};
use crate::youtube::client::{ChannelLookup, MAX_IDS_PER_REQUEST};

pub const CACHE_HEADER: [&str; 4] = ["channel_id", "status", "channel_title", "last_checked_utc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Ok,
    Missing,
    Invalid,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Ok => "ok",
            CacheStatus::Missing => "missing",
            CacheStatus::Invalid => "invalid",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ok" => Some(CacheStatus::Ok),
            "missing" => Some(CacheStatus::Missing),
            "invalid" => Some(CacheStatus::Invalid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: CacheStatus,
    pub channel_title: String,
    pub last_checked_utc: String,
}

/// Persistent map of identifier -> validation outcome.
///
/// `ok` entries short-circuit future server round-trips; `missing` and
/// `invalid` entries are sticky until the cache file is deleted. The file is
/// rewritten wholesale after each resolution pass, sorted by identifier.
#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl ValidationCache {
    /// Load the cache file; a missing file is an empty cache, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Ok(Self::default()),
        };
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(raw.as_bytes());
        let mut entries = BTreeMap::new();
        for record in rdr.records() {
            let record = record.with_context(|| format!("parse {}", path.display()))?;
            let id = record.get(0).unwrap_or("").to_string();
            let Some(status) = CacheStatus::parse(record.get(1).unwrap_or("")) else {
                continue;
            };
            if id.is_empty() {
                continue;
            }
            entries.insert(
                id,
                CacheEntry {
                    status,
                    channel_title: record.get(2).unwrap_or("").to_string(),
                    last_checked_utc: record.get(3).unwrap_or("").to_string(),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rows = self.entries.iter().map(|(id, e)| {
            vec![
                id.clone(),
                e.status.as_str().to_string(),
                e.channel_title.clone(),
                e.last_checked_utc.clone(),
            ]
        });
        persist::atomic_write_csv(path, &CACHE_HEADER, rows)
    }

    pub fn status_of(&self, channel_id: &str) -> Option<CacheStatus> {
        self.entries.get(channel_id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mark(&mut self, channel_id: &str, status: CacheStatus, title: String) {
        self.entries.insert(
            channel_id.to_string(),
            CacheEntry {
                status,
                channel_title: title,
                last_checked_utc: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
        );
    }

    /// Remember validator-rejected identifiers so they are never re-checked.
    pub fn record_invalid<'a, I: IntoIterator<Item = &'a str>>(&mut self, ids: I) {
        for id in ids {
            self.mark(id, CacheStatus::Invalid, String::new());
        }
    }

    /// Resolve syntactically valid candidates to the confirmed set.
    ///
    /// Cached `ok` ids are trusted without a network call; cached `missing`
    /// and `invalid` ids are excluded without one. The rest are checked in
    /// platform-batch groups: ids the platform returns become `ok`, ids
    /// absent from a successfully-completed batch become `missing` (with a
    /// NOT_FOUND record). A batch whose call fails after retries marks
    /// nothing — "we could not check" is not "it does not exist" — and its
    /// ids are excluded from this run only, with API_ERROR records.
    pub async fn resolve<L: ChannelLookup>(
        &mut self,
        candidates: &[String],
        lookup: &L,
        report: &mut RunReport,
    ) -> Vec<String> {
        let mut confirmed = Vec::new();
        let mut unchecked = Vec::new();
        for id in candidates {
            match self.status_of(id) {
                Some(CacheStatus::Ok) => confirmed.push(id.clone()),
                Some(CacheStatus::Missing) | Some(CacheStatus::Invalid) => {
                    debug!(channel = %id, "skipping id cached as dead");
                }
                None => unchecked.push(id.clone()),
            }
        }

        if !unchecked.is_empty() {
            info!(count = unchecked.len(), "validating uncached channel ids");
        }
        for batch in unchecked.chunks(MAX_IDS_PER_REQUEST) {
            match lookup.lookup_channels(batch).await {
                Ok(items) => {
                    let returned: BTreeMap<&str, String> = items
                        .iter()
                        .map(|item| (item.id.as_str(), item.title()))
                        .collect();
                    for id in batch {
                        if let Some(title) = returned.get(id.as_str()) {
                            self.mark(id, CacheStatus::Ok, title.clone());
                            confirmed.push(id.clone());
                        } else {
                            self.mark(id, CacheStatus::Missing, String::new());
                            report.push(
                                id.clone(),
                                ErrorKind::NotFound,
                                "channel not returned by the platform",
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(batch_size = batch.len(), error = %e, "validation batch failed, ids keep prior state");
                    for id in batch {
                        report.push(id.clone(), ErrorKind::ApiError, e.to_string());
                    }
                }
            }
        }

        confirmed
    }
}
