use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::env::{env_opt, env_parse, env_req};

/// Runtime configuration, resolved once from the environment.
///
/// `YOUTUBE_API_KEY` is the only mandatory variable; everything else has a
/// default matching the scheduled-run deployment. All output files live under
/// `data_dir`.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub data_dir: PathBuf,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub http_timeout_secs: u64,
    pub pool_size: usize,
    pub recent_n: usize,
    pub top_n: usize,
    pub top_window_months: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = env_req("YOUTUBE_API_KEY")?;
        let api_base = env_opt("TUBETRACK_API_BASE")
            .unwrap_or_else(|| "https://www.googleapis.com/youtube/v3".to_string());
        let data_dir = PathBuf::from(env_opt("TUBETRACK_DATA_DIR").unwrap_or_else(|| ".".into()));
        Ok(Self {
            api_key,
            api_base,
            data_dir,
            max_retries: env_parse("TUBETRACK_MAX_RETRIES", 3u32),
            backoff_ms: env_parse("TUBETRACK_BACKOFF_MS", 500u64),
            http_timeout_secs: env_parse("TUBETRACK_HTTP_TIMEOUT_SECS", 30u64),
            pool_size: env_parse("TUBETRACK_POOL_SIZE", 120usize),
            recent_n: env_parse("TUBETRACK_RECENT_N", 20usize),
            top_n: env_parse("TUBETRACK_TOP_N", 20usize),
            top_window_months: env_parse("TUBETRACK_TOP_WINDOW_MONTHS", 12u32),
        })
    }

    pub fn reference_path(&self) -> PathBuf {
        self.data_dir.join("channels_reference.csv")
    }

    pub fn daily_path(&self) -> PathBuf {
        self.data_dir.join("youtube_daily_snapshots.csv")
    }

    pub fn daily_errors_path(&self) -> PathBuf {
        self.data_dir.join("daily_errors.csv")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("validation_cache.csv")
    }

    /// Monthly artifacts are one file per calendar period, rewritten wholesale
    /// on every run within that period.
    pub fn monthly_path(&self, month: &str) -> PathBuf {
        self.data_dir
            .join(format!("youtube_monthly_videos_snapshots_{month}.csv"))
    }

    pub fn monthly_errors_path(&self, month: &str) -> PathBuf {
        self.data_dir
            .join(format!("youtube_monthly_errors_{month}.csv"))
    }
}

/// Test-friendly constructor bypassing the environment.
impl Config {
    pub fn for_dir(dir: &Path, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            data_dir: dir.to_path_buf(),
            max_retries: 3,
            backoff_ms: 1,
            http_timeout_secs: 30,
            pool_size: 120,
            recent_n: 20,
            top_n: 20,
            top_window_months: 12,
        }
    }
}
