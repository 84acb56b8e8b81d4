//! Configuration management for AdLedger.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main application configuration.
///
/// This is loaded from `~/.config/adledger/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database location settings
    pub database: DatabaseConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Scraper surface settings
    pub scraping: ScrapingConfig,
    /// Ad platform API client settings
    pub searchad: SearchAdConfig,
    /// Task lifecycle and reconciliation settings
    pub sync: SyncConfig,
    /// Periodic trigger settings
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `ADLEDGER_DATABASE_PATH`: Override the SQLite database file
    /// - `ADLEDGER_HEADLESS`: Override browser headless mode (true/false)
    /// - `ADLEDGER_SNAPSHOT_DIR`: Directory for raw-content snapshots of failed parses
    /// - `ADLEDGER_SYNC_DAYS`: Override the default backfill window
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if !(0.0..=1.0).contains(&self.sync.variance_threshold) {
            return Err(invalid("sync.variance_threshold", "must be between 0 and 1"));
        }
        if self.sync.max_task_failures == 0 {
            return Err(invalid("sync.max_task_failures", "must be at least 1"));
        }
        if self.sync.running_lease_minutes == 0 {
            return Err(invalid("sync.running_lease_minutes", "must be at least 1"));
        }
        if self.browser.retry_delay_min_ms > self.browser.retry_delay_max_ms {
            return Err(invalid("browser.retry_delay_min_ms", "exceeds retry_delay_max_ms"));
        }
        Ok(())
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ADLEDGER_DATABASE_PATH") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("ADLEDGER_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("ADLEDGER_SNAPSHOT_DIR") {
            tracing::debug!("Override scraping.snapshot_dir from env: {}", val);
            self.scraping.snapshot_dir = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("ADLEDGER_SYNC_DAYS") {
            if let Ok(days) = val.parse() {
                self.sync.default_days = days;
                tracing::debug!("Override sync.default_days from env: {}", days);
            }
        }
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/adledger/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "adledger", "adledger").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/adledger`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "adledger", "adledger").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the database file, defaulting to `<data_dir>/adledger.db`.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("adledger.db")),
        }
    }
}

/// Database location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path (defaults to the data directory)
    pub path: Option<PathBuf>,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Extra navigation attempts after a timeout
    pub navigation_retries: u32,
    /// Lower bound of the random delay between navigation retries
    pub retry_delay_min_ms: u64,
    /// Upper bound of the random delay between navigation retries
    pub retry_delay_max_ms: u64,
    /// Minimum spacing between two fetches to the same host
    pub min_domain_interval_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: 90,
            navigation_retries: 2,
            retry_delay_min_ms: 2000,
            retry_delay_max_ms: 4000,
            min_domain_interval_ms: 1000,
        }
    }
}

/// Scraper surface settings.
///
/// URL templates take a `{query}` placeholder that is replaced with the
/// percent-encoded keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Place (map listing) search endpoint returning JSON
    pub place_url: String,
    /// Mobile place list page, parsed when the JSON endpoint yields nothing
    pub place_list_url: String,
    /// VIEW (blog/cafe) search page
    pub view_url: String,
    /// Power-link ad search page
    pub ad_url: String,
    /// Maximum wait for script-driven rendering, in milliseconds
    pub render_wait_ms: u64,
    /// Scroll steps simulated on DOM surfaces
    pub scroll_steps: u32,
    /// Where raw content is saved when every parse strategy fails
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            place_url: "https://map.naver.com/p/api/search/allSearch?query={query}&type=all&searchCoord=&boundary=".to_string(),
            place_list_url: "https://m.place.naver.com/place/list?query={query}".to_string(),
            view_url: "https://search.naver.com/search.naver?where=view&query={query}".to_string(),
            ad_url: "https://ad.search.naver.com/search.naver?where=ad&query={query}".to_string(),
            render_wait_ms: 3000,
            scroll_steps: 3,
            snapshot_dir: None,
        }
    }
}

/// Ad platform API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchAdConfig {
    /// API base URL
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retry budget for transient failures on GET
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub base_delay_ms: u64,
}

impl Default for SearchAdConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.searchad.naver.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Task lifecycle and reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backfill window used when a run does not specify one
    pub default_days: u32,
    /// Lifetime failures after which a task is no longer reset automatically
    pub max_task_failures: u32,
    /// Error strings kept in a run summary
    pub max_summary_errors: usize,
    /// Relative spend variance above which reconciliation records a note
    pub variance_threshold: f64,
    /// Minutes a task may stay running before a run treats it as abandoned
    pub running_lease_minutes: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_days: 7,
            max_task_failures: 5,
            max_summary_errors: 20,
            variance_threshold: 0.10,
            running_lease_minutes: 120,
        }
    }
}

/// Periodic trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Hours between rank captures
    pub rank_interval_hours: u32,
    /// Hours between metric syncs
    pub metrics_interval_hours: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rank_interval_hours: 1,
            metrics_interval_hours: 24,
        }
    }
}
