use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::mastodon::publish::DEFAULT_VISIBILITY;

pub const DEFAULT_SCRAPER: &str = "twint";
pub const DEFAULT_DOWNLOADER: &str = "yt-dlp";
pub const DEFAULT_FFMPEG: &str = "ffmpeg";
pub const DEFAULT_FFPROBE: &str = "ffprobe";
pub const DEFAULT_MIRROR_HOST: &str = "nitter.net";
pub const DEFAULT_MAX_VIDEO_MB: u64 = 40;
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Process-wide settings loaded from environment variables.
///
/// The per-run identity (accounts, token, instance) comes from the command
/// line instead. The .env file is loaded automatically at startup via
/// dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the per-account working directories.
    pub data_dir: PathBuf,
    pub scraper: String,
    pub downloader: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Privacy-friendly front end that replaces the source host in links.
    pub mirror_host: String,
    /// Upper bound on uploaded video size, in MiB. The destination's own
    /// limit applies when it is smaller.
    pub max_video_mb: u64,
    /// Posts requested from the scraper per run.
    pub batch_size: usize,
    pub visibility: String,
}

impl Config {
    /// Load configuration from environment variables. Every setting has a
    /// default, so this only fails on values that don't parse.
    pub fn load() -> Result<Self> {
        let data_dir = env::var("TOOTBRIDGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Ok(Self {
            data_dir,
            scraper: env_or("TOOTBRIDGE_SCRAPER", DEFAULT_SCRAPER),
            downloader: env_or("TOOTBRIDGE_DOWNLOADER", DEFAULT_DOWNLOADER),
            ffmpeg: env_or("TOOTBRIDGE_FFMPEG", DEFAULT_FFMPEG),
            ffprobe: env_or("TOOTBRIDGE_FFPROBE", DEFAULT_FFPROBE),
            mirror_host: env_or("TOOTBRIDGE_MIRROR_HOST", DEFAULT_MIRROR_HOST),
            max_video_mb: parse_env("TOOTBRIDGE_MAX_VIDEO_MB", DEFAULT_MAX_VIDEO_MB)?,
            batch_size: parse_env("TOOTBRIDGE_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            visibility: env_or("TOOTBRIDGE_VISIBILITY", DEFAULT_VISIBILITY),
        })
    }

    /// Working directory for one source account.
    pub fn account_dir(&self, source_account: &str) -> PathBuf {
        self.data_dir.join(source_account)
    }

    /// Create the account directory if needed. A file in its place is an
    /// error.
    pub fn ensure_account_dir(&self, source_account: &str) -> Result<PathBuf> {
        let dir = self.account_dir(source_account);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    pub fn max_video_bytes(&self) -> u64 {
        self.max_video_mb.saturating_mul(1024 * 1024)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("tootbridge"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got \"{raw}\"")),
        _ => Ok(default),
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            anyhow::bail!(
                "Cannot create directory \"{}\" because a file with this name already exists",
                dir.display()
            );
        }
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create directory \"{}\"", dir.display()))
}
