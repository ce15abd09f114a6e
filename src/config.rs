//! Configuration types for telegram-lake

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Telegram API credentials and identity
///
/// The library never dials the remote itself; these values exist so an
/// embedder can build its protocol session from the same configuration
/// source as the scraper.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// API ID issued with the application registration (default: 0, unset)
    #[serde(default)]
    pub api_id: i64,

    /// API hash issued with the application registration
    #[serde(default)]
    pub api_hash: String,

    /// Phone number tied to the scraping account
    #[serde(default)]
    pub phone: String,

    /// Channels to scrape, with or without the leading '@'
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            phone: String::new(),
            channels: Vec::new(),
        }
    }
}

/// Scrape behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Maximum raw messages drawn from the iterator per channel per run
    /// (default: 100)
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,

    /// Messages requested per iterator page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
            page_size: default_page_size(),
        }
    }
}

/// Retry configuration for failed channel scrapes
///
/// Attempt N that fails transiently waits `backoff_base * N` before the
/// next attempt. Flood waits dictated by the remote do not count against
/// `max_retries`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum scrape attempts per channel (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff interval (default: 5s)
    #[serde(with = "duration_serde", default = "default_backoff_base")]
    pub backoff_base: Duration,

    /// Add random jitter (up to one extra base interval) to backoff delays
    /// (default: false, keeping the schedule deterministic)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            jitter: false,
        }
    }
}

/// Proactive pacing configuration
///
/// Self-imposed pauses between bursts of accepted messages, independent of
/// any backoff the remote forces on us.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Accepted messages between pauses; 0 disables pacing (default: 10)
    #[serde(default = "default_pacing_batch_size")]
    pub batch_size: u64,

    /// Pause duration after each batch (default: 1s)
    #[serde(with = "duration_serde", default = "default_pacing_pause")]
    pub pause: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_pacing_batch_size(),
            pause: default_pacing_pause(),
        }
    }
}

/// Storage roots for the lake and media trees
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the date-partitioned lake tree
    /// (default: "data/raw/telegram_messages")
    #[serde(default = "default_lake_root")]
    pub lake_root: PathBuf,

    /// Root of the per-channel media tree (default: "data/raw/media")
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lake_root: default_lake_root(),
            media_root: default_media_root(),
        }
    }
}

/// Main configuration for the scraper
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram credentials and channel list
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Scrape behavior
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Retry/backoff behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Proactive pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Lake and media storage roots
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file from the working directory first when one
    /// exists, then the process environment. Recognized variables:
    ///
    /// - `TELEGRAM_API_ID`
    /// - `TELEGRAM_API_HASH`
    /// - `TELEGRAM_PHONE`
    /// - `TELEGRAM_CHANNELS` (comma-separated channel names)
    /// - `TELEGRAM_LAKE_ROOT`
    /// - `TELEGRAM_MEDIA_ROOT`
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(api_id) = std::env::var("TELEGRAM_API_ID") {
            config.telegram.api_id = api_id.parse().map_err(|_| Error::Config {
                message: format!("TELEGRAM_API_ID is not a number: {api_id}"),
                key: Some("telegram.api_id".into()),
            })?;
        }
        if let Ok(api_hash) = std::env::var("TELEGRAM_API_HASH") {
            config.telegram.api_hash = api_hash;
        }
        if let Ok(phone) = std::env::var("TELEGRAM_PHONE") {
            config.telegram.phone = phone;
        }
        if let Ok(channels) = std::env::var("TELEGRAM_CHANNELS") {
            config.telegram.channels = parse_channel_list(&channels);
        }
        if let Ok(lake_root) = std::env::var("TELEGRAM_LAKE_ROOT") {
            config.storage.lake_root = PathBuf::from(lake_root);
        }
        if let Ok(media_root) = std::env::var("TELEGRAM_MEDIA_ROOT") {
            config.storage.media_root = PathBuf::from(media_root);
        }

        Ok(config)
    }

    /// Check the settings the scraper depends on.
    ///
    /// Credentials are deliberately not checked here; the session
    /// implementation owns authentication and fails with
    /// [`crate::SessionError::Auth`] when they are wrong.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_retries == 0 {
            return Err(Error::Config {
                message: "max_retries must be at least 1".into(),
                key: Some("retry.max_retries".into()),
            });
        }
        if self.scrape.page_size == 0 {
            return Err(Error::Config {
                message: "page_size must be at least 1".into(),
                key: Some("scrape.page_size".into()),
            });
        }
        for channel in &self.telegram.channels {
            if channel.trim_start_matches('@').trim().is_empty() {
                return Err(Error::Config {
                    message: format!("blank channel name in channel list: '{channel}'"),
                    key: Some("telegram.channels".into()),
                });
            }
        }
        Ok(())
    }
}

/// Split a comma-separated channel list, trimming whitespace and dropping
/// empty entries.
pub fn parse_channel_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_message_limit() -> usize {
    100
}

fn default_page_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(5)
}

fn default_pacing_batch_size() -> u64 {
    10
}

fn default_pacing_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_lake_root() -> PathBuf {
    PathBuf::from("data/raw/telegram_messages")
}

fn default_media_root() -> PathBuf {
    PathBuf::from("data/raw/media")
}

// Duration serialization helper (stores durations as integer seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
