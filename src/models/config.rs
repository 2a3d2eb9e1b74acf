//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Pre-flight liveness probing
    #[serde(default)]
    pub reachability: ReachabilityConfig,

    /// Failure ledger location and retry ceiling
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Archive extraction settings
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Background retry loop
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.concurrency == 0 {
            return Err(AppError::validation("fetch.concurrency must be > 0"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(AppError::validation("fetch.max_attempts must be > 0"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.chunk_size == 0 {
            return Err(AppError::validation("fetch.chunk_size must be > 0"));
        }
        if self.reachability.timeout_secs == 0 {
            return Err(AppError::validation(
                "reachability.timeout_secs must be > 0",
            ));
        }
        if self.reachability.concurrency == 0 {
            return Err(AppError::validation(
                "reachability.concurrency must be > 0",
            ));
        }
        if self.ledger.retry_ceiling == 0 {
            return Err(AppError::validation("ledger.retry_ceiling must be > 0"));
        }
        if self.schedule.interval_secs == 0 {
            return Err(AppError::validation("schedule.interval_secs must be > 0"));
        }
        Ok(())
    }
}

/// HTTP client and download behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Root directory for downloads
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    /// Maximum concurrent downloads
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,

    /// Attempts per URL within one pass
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Connect and read timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Bytes written per chunk while streaming
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// First backoff step in milliseconds
    #[serde(default = "defaults::backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff sleep
    #[serde(default = "defaults::backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_dir: defaults::output_dir(),
            concurrency: defaults::concurrency(),
            max_attempts: defaults::max_attempts(),
            timeout_secs: defaults::timeout(),
            user_agent: defaults::user_agent(),
            chunk_size: defaults::chunk_size(),
            backoff_base_ms: defaults::backoff_base_ms(),
            backoff_cap_secs: defaults::backoff_cap_secs(),
        }
    }
}

/// Reachability pre-flight settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityConfig {
    /// Probe candidates before downloading
    #[serde(default)]
    pub enabled: bool,

    /// Per-probe timeout in seconds
    #[serde(default = "defaults::probe_timeout")]
    pub timeout_secs: u64,

    /// Concurrent probes
    #[serde(default = "defaults::probe_concurrency")]
    pub concurrency: usize,
}

impl ReachabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: defaults::probe_timeout(),
            concurrency: defaults::probe_concurrency(),
        }
    }
}

/// Failure ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the JSON ledger
    #[serde(default = "defaults::ledger_path")]
    pub path: PathBuf,

    /// Lifetime attempts below which a failed URL is retried again
    #[serde(default = "defaults::retry_ceiling")]
    pub retry_ceiling: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: defaults::ledger_path(),
            retry_ceiling: defaults::retry_ceiling(),
        }
    }
}

/// Archive extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Extract downloaded archives
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Remove the archive after a complete extraction
    #[serde(default)]
    pub delete_source: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            delete_source: false,
        }
    }
}

/// Background loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between retry passes
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Fetch defaults
    pub fn output_dir() -> PathBuf {
        PathBuf::from("data/downloads")
    }
    pub fn concurrency() -> usize {
        4
    }
    pub fn max_attempts() -> u32 {
        5
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn user_agent() -> String {
        concat!("bulkfetch/", env!("CARGO_PKG_VERSION")).into()
    }
    pub fn chunk_size() -> usize {
        64 * 1024
    }
    pub fn backoff_base_ms() -> u64 {
        1000
    }
    pub fn backoff_cap_secs() -> u64 {
        60
    }

    // Reachability defaults
    pub fn probe_timeout() -> u64 {
        10
    }
    pub fn probe_concurrency() -> usize {
        16
    }

    // Ledger defaults
    pub fn ledger_path() -> PathBuf {
        PathBuf::from("data/failures.json")
    }
    pub fn retry_ceiling() -> u32 {
        25
    }

    pub fn enabled() -> bool {
        true
    }
    pub fn interval() -> u64 {
        3600
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
