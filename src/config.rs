// Runtime configuration, read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::downloader::errors::{DownloadError, Result};
use crate::downloader::metadata::DEFAULT_METADATA_TIMEOUT;
use crate::downloader::tools::find_ytdlp;

pub const LEDGER_FILE_NAME: &str = ".download-jobs.json";

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Root under which per-platform directories are created
    pub download_base_dir: PathBuf,
    /// yt-dlp executable
    pub external_tool_path: String,
    pub max_retries: u32,
    pub fragment_retries: u32,
    pub concurrent_fragments: u32,
    /// Passed to `--limit-rate`, e.g. `5M`
    pub throttle_rate: String,
    pub ledger_path: PathBuf,
    pub metadata_timeout: Duration,
    pub retention_days: u32,
}

fn default_base_dir() -> PathBuf {
    dirs::download_dir()
        .map(|dir| dir.join("video-downloader"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        let download_base_dir = default_base_dir();
        Self {
            ledger_path: download_base_dir.join(LEDGER_FILE_NAME),
            download_base_dir,
            external_tool_path: "yt-dlp".to_string(),
            max_retries: 10,
            fragment_retries: 10,
            concurrent_fragments: 4,
            throttle_rate: "5M".to_string(),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            retention_days: 30,
        }
    }
}

impl DownloaderConfig {
    /// Build from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let download_base_dir = get("DOWNLOAD_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.download_base_dir);
        let ledger_path = get("DOWNLOAD_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| download_base_dir.join(LEDGER_FILE_NAME));
        let external_tool_path = get("YTDLP_PATH").unwrap_or_else(find_ytdlp);

        Ok(Self {
            download_base_dir,
            external_tool_path,
            max_retries: parse_var(&get, "YTDLP_MAX_RETRIES", defaults.max_retries)?,
            fragment_retries: parse_var(&get, "YTDLP_FRAGMENT_RETRIES", defaults.fragment_retries)?,
            concurrent_fragments: parse_var(
                &get,
                "YTDLP_CONCURRENT_FRAGMENTS",
                defaults.concurrent_fragments,
            )?,
            throttle_rate: get("YTDLP_THROTTLE_RATE").unwrap_or(defaults.throttle_rate),
            ledger_path,
            metadata_timeout: Duration::from_millis(parse_var(
                &get,
                "YTDLP_METADATA_TIMEOUT_MS",
                defaults.metadata_timeout.as_millis() as u64,
            )?),
            retention_days: parse_var(&get, "DOWNLOAD_RETENTION_DAYS", defaults.retention_days)?,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DownloadError::config(format!("{}={:?}: {}", key, raw, e))),
    }
}
