use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::persist;

/// Columns the daily refresh owns. Every other column in the reference file
/// is operator-entered and carried forward verbatim.
pub const AUTO_COLUMNS: [&str; 8] = [
    "channel_id",
    "channel_title",
    "custom_url",
    "channel_url",
    "country",
    "channel_published_at",
    "uploads_playlist_id",
    "last_seen_utc",
];

/// One channel's row in the reference table.
#[derive(Debug, Clone, Default)]
pub struct ChannelReference {
    pub channel_id: String,
    pub channel_title: String,
    pub custom_url: String,
    pub channel_url: String,
    pub country: String,
    pub channel_published_at: String,
    pub uploads_playlist_id: String,
    pub last_seen_utc: String,
    /// Manual columns (notes, tags, language, ...) in file order.
    pub manual: IndexMap<String, String>,
}

/// The canonical URL is always derivable from the identifier; it is the one
/// auto field that never falls back to a previous value.
pub fn channel_url_for(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}")
}

/// Freshly observed auto fields for one channel. Empty strings mean "the
/// platform did not give us a value this run".
#[derive(Debug, Clone, Default)]
pub struct ReferenceUpdate {
    pub channel_id: String,
    pub channel_title: String,
    pub custom_url: String,
    pub country: String,
    pub channel_published_at: String,
    pub uploads_playlist_id: String,
    pub last_seen_utc: String,
}

/// The human/machine-editable reference table. Read once per run, rewritten
/// wholesale (sorted by identifier) at the end of the daily pipeline. It also
/// backs the channel roster both pipelines iterate.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    channels: IndexMap<String, ChannelReference>,
    manual_columns: Vec<String>,
    /// Every non-empty channel_id cell in file order, repeats included, so
    /// the validator can flag duplicates the map would silently collapse.
    raw_ids: Vec<String>,
}

fn sniff_delimiter(sample: &str) -> u8 {
    let commas = sample.matches(',').count();
    let semis = sample.matches(';').count();
    if semis > commas {
        b';'
    } else {
        b','
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

impl ReferenceTable {
    /// Load the reference file. A missing file is fatal: the roster is a
    /// mandatory input for every run.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("mandatory reference file {} not readable", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let text = strip_bom(raw);
        let sample: String = text.chars().take(2048).collect();
        let delimiter = sniff_delimiter(&sample);
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| strip_bom(h.trim()).to_string())
            .collect();
        let Some(id_col) = headers.iter().position(|h| h == "channel_id") else {
            bail!("reference file is missing the required channel_id column");
        };

        let manual_columns: Vec<String> = headers
            .iter()
            .filter(|h| !AUTO_COLUMNS.contains(&h.as_str()) && !h.is_empty())
            .cloned()
            .collect();

        let mut channels: IndexMap<String, ChannelReference> = IndexMap::new();
        let mut raw_ids: Vec<String> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let field = |col: &str| -> String {
                headers
                    .iter()
                    .position(|h| h == col)
                    .and_then(|i| record.get(i))
                    .map(|v| strip_bom(v.trim()).to_string())
                    .unwrap_or_default()
            };
            let channel_id = record
                .get(id_col)
                .map(|v| strip_bom(v.trim()).to_string())
                .unwrap_or_default();
            if channel_id.is_empty() {
                continue;
            }
            raw_ids.push(channel_id.clone());
            let mut reference = ChannelReference {
                channel_id: channel_id.clone(),
                channel_title: field("channel_title"),
                custom_url: field("custom_url"),
                channel_url: field("channel_url"),
                country: field("country"),
                channel_published_at: field("channel_published_at"),
                uploads_playlist_id: field("uploads_playlist_id"),
                last_seen_utc: field("last_seen_utc"),
                manual: IndexMap::new(),
            };
            for col in &manual_columns {
                reference.manual.insert(col.clone(), field(col));
            }
            channels.insert(channel_id, reference);
        }

        Ok(Self {
            channels,
            manual_columns,
            raw_ids,
        })
    }

    /// Channel ids in file order, repeats included; this is the roster both
    /// pipelines feed through the validator.
    pub fn roster(&self) -> &[String] {
        &self.raw_ids
    }

    pub fn get(&self, channel_id: &str) -> Option<&ChannelReference> {
        self.channels.get(channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Upsert one channel's auto fields. Fresh non-empty values replace the
    /// stored ones; empty fresh values keep the prior value. Manual fields
    /// are never touched here.
    pub fn apply_update(&mut self, update: ReferenceUpdate) {
        let entry = self
            .channels
            .entry(update.channel_id.clone())
            .or_insert_with(|| ChannelReference {
                channel_id: update.channel_id.clone(),
                ..ChannelReference::default()
            });

        let keep = |fresh: String, prior: &str| -> String {
            if fresh.is_empty() {
                prior.to_string()
            } else {
                fresh
            }
        };
        entry.channel_title = keep(update.channel_title, &entry.channel_title);
        entry.custom_url = keep(update.custom_url, &entry.custom_url);
        entry.country = keep(update.country, &entry.country);
        entry.channel_published_at =
            keep(update.channel_published_at, &entry.channel_published_at);
        entry.uploads_playlist_id = keep(update.uploads_playlist_id, &entry.uploads_playlist_id);
        entry.last_seen_utc = keep(update.last_seen_utc, &entry.last_seen_utc);
        entry.channel_url = channel_url_for(&update.channel_id);
    }

    /// Full rewrite, rows sorted by identifier, manual columns preserved in
    /// their first-seen order after the auto columns.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut header: Vec<&str> = AUTO_COLUMNS.to_vec();
        header.extend(self.manual_columns.iter().map(|s| s.as_str()));

        let rows = self.channels.keys().sorted().map(|id| {
            let r = &self.channels[id];
            let mut row = vec![
                r.channel_id.clone(),
                r.channel_title.clone(),
                r.custom_url.clone(),
                if r.channel_url.is_empty() {
                    channel_url_for(&r.channel_id)
                } else {
                    r.channel_url.clone()
                },
                r.country.clone(),
                r.channel_published_at.clone(),
                r.uploads_playlist_id.clone(),
                r.last_seen_utc.clone(),
            ];
            for col in &self.manual_columns {
                row.push(r.manual.get(col).cloned().unwrap_or_default());
            }
            row
        });
        persist::atomic_write_csv(path, &header, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UC_A: &str = "UCaaaaaaaaaaaaaaaaaaaaaa";
    const UC_B: &str = "UCbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn parses_comma_delimited_with_manual_columns() {
        let raw = format!(
            "channel_id,channel_title,notes,language\n{UC_A},Marco,weekly review,fr\n{UC_B},,,\n"
        );
        let table = ReferenceTable::parse(&raw).unwrap();
        assert_eq!(table.roster(), vec![UC_A.to_string(), UC_B.to_string()]);
        let a = table.get(UC_A).unwrap();
        assert_eq!(a.channel_title, "Marco");
        assert_eq!(a.manual.get("notes").map(String::as_str), Some("weekly review"));
        assert_eq!(a.manual.get("language").map(String::as_str), Some("fr"));
    }

    #[test]
    fn sniffs_semicolon_delimiter() {
        let raw = format!("channel_id;channel_title;notes\n{UC_A};Marco;a;b\n");
        let table = ReferenceTable::parse(&raw).unwrap();
        assert_eq!(table.get(UC_A).unwrap().channel_title, "Marco");
    }

    #[test]
    fn strips_byte_order_mark_from_header() {
        let raw = format!("\u{feff}channel_id,channel_title\n{UC_A},Marco\n");
        let table = ReferenceTable::parse(&raw).unwrap();
        assert_eq!(table.get(UC_A).unwrap().channel_title, "Marco");
    }

    #[test]
    fn missing_channel_id_column_is_fatal() {
        assert!(ReferenceTable::parse("title,notes\nMarco,x\n").is_err());
    }

    #[test]
    fn update_replaces_auto_fields_and_keeps_manual() {
        let raw = format!("channel_id,channel_title,notes\n{UC_A},Old Title,keep me\n");
        let mut table = ReferenceTable::parse(&raw).unwrap();
        table.apply_update(ReferenceUpdate {
            channel_id: UC_A.to_string(),
            channel_title: "New Title".to_string(),
            country: "FR".to_string(),
            last_seen_utc: "2026-08-29 12:00:00".to_string(),
            ..ReferenceUpdate::default()
        });
        let a = table.get(UC_A).unwrap();
        assert_eq!(a.channel_title, "New Title");
        assert_eq!(a.country, "FR");
        assert_eq!(a.channel_url, channel_url_for(UC_A));
        assert_eq!(a.manual.get("notes").map(String::as_str), Some("keep me"));
    }

    #[test]
    fn empty_fresh_values_fall_back_to_prior() {
        let raw = format!(
            "channel_id,channel_title,country,uploads_playlist_id\n{UC_A},Old,FR,UUaaaaaaaaaaaaaaaaaaaaaa\n"
        );
        let mut table = ReferenceTable::parse(&raw).unwrap();
        table.apply_update(ReferenceUpdate {
            channel_id: UC_A.to_string(),
            channel_title: String::new(),
            ..ReferenceUpdate::default()
        });
        let a = table.get(UC_A).unwrap();
        assert_eq!(a.channel_title, "Old");
        assert_eq!(a.country, "FR");
        assert_eq!(a.uploads_playlist_id, "UUaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn update_without_a_channel_never_touches_it() {
        let raw = format!("channel_id,channel_title,notes\n{UC_A},Marco,note-a\n{UC_B},Other,note-b\n");
        let mut table = ReferenceTable::parse(&raw).unwrap();
        table.apply_update(ReferenceUpdate {
            channel_id: UC_A.to_string(),
            channel_title: "Marco!".to_string(),
            ..ReferenceUpdate::default()
        });
        let b = table.get(UC_B).unwrap();
        assert_eq!(b.channel_title, "Other");
        assert_eq!(b.manual.get("notes").map(String::as_str), Some("note-b"));
    }

    #[test]
    fn save_sorts_rows_by_identifier() {
        let raw = format!("channel_id,channel_title\n{UC_B},B\n{UC_A},A\n");
        let table = ReferenceTable::parse(&raw).unwrap();
        let path = std::env::temp_dir().join(format!(
            "tubetrack_roster_{}_sorted.csv",
            std::process::id()
        ));
        table.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].starts_with(UC_A));
        assert!(lines[2].starts_with(UC_B));
        fs::remove_file(&path).unwrap();
    }
}
