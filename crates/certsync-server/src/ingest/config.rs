//! Ingestion configuration
//!
//! `INGEST_*` environment variables for the tick scheduler and both source
//! adapters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::levels::LevelRemap;

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TICK_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_BATCH_CAP: usize = 200;
pub const DEFAULT_WRITE_CONCURRENCY: usize = 16;

pub const DEFAULT_NAR_BASE_URL: &str = "https://api.nar.org/membership/v1";
pub const DEFAULT_NAR_PAGE_SIZE: u32 = 200;
pub const DEFAULT_NAR_IDLE_INTERVAL_HOURS: u64 = 6;
pub const DEFAULT_NAR_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_TRA_URL: &str = "https://www.tripoli.org/certifications/export.csv";
pub const DEFAULT_TRA_REFRESH_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_TRA_TIMEOUT_SECS: u64 = 60;

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Whether the in-process scheduler runs
    pub enabled: bool,
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
    /// Upper bound on a single organization's tick
    pub tick_timeout_secs: u64,
    /// Maximum records written per snapshot tick
    pub batch_cap: usize,
    /// Maximum in-flight upserts
    pub write_concurrency: usize,
    /// Secret required by the manual snapshot endpoint; unset refuses all
    #[serde(skip_serializing)]
    pub shared_secret: Option<String>,
    pub nar: NarConfig,
    pub tra: TraConfig,
}

/// NAR membership API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarConfig {
    pub enabled: bool,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub page_size: u32,
    /// Cooldown after a completed pass
    pub idle_interval_hours: u64,
    pub timeout_secs: u64,
}

/// TRA snapshot dump configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraConfig {
    pub enabled: bool,
    pub url: String,
    /// Minimum seconds between snapshot ticks when nothing is pending
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
    pub delimiter: u8,
    pub level_map: LevelRemap,
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            enabled: env_flag("INGEST_ENABLED", false),
            tick_interval_secs: env_parse("INGEST_TICK_INTERVAL_SECS", DEFAULT_TICK_INTERVAL_SECS),
            tick_timeout_secs: env_parse("INGEST_TICK_TIMEOUT_SECS", DEFAULT_TICK_TIMEOUT_SECS),
            batch_cap: env_parse("INGEST_BATCH_CAP", DEFAULT_BATCH_CAP),
            write_concurrency: env_parse("INGEST_WRITE_CONCURRENCY", DEFAULT_WRITE_CONCURRENCY),
            shared_secret: std::env::var("INGEST_SHARED_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            nar: NarConfig::from_env(),
            tra: TraConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_secs == 0 {
            anyhow::bail!("INGEST_TICK_INTERVAL_SECS must be greater than 0");
        }
        if self.tick_timeout_secs == 0 {
            anyhow::bail!("INGEST_TICK_TIMEOUT_SECS must be greater than 0");
        }
        if self.batch_cap == 0 {
            anyhow::bail!("INGEST_BATCH_CAP must be greater than 0");
        }
        if self.write_concurrency == 0 {
            anyhow::bail!("INGEST_WRITE_CONCURRENCY must be greater than 0");
        }
        self.nar.validate()?;
        self.tra.validate()?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            tick_timeout_secs: DEFAULT_TICK_TIMEOUT_SECS,
            batch_cap: DEFAULT_BATCH_CAP,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            shared_secret: None,
            nar: NarConfig::default(),
            tra: TraConfig::default(),
        }
    }
}

impl NarConfig {
    /// Load NAR configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env_flag("INGEST_NAR_ENABLED", true),
            base_url: std::env::var("INGEST_NAR_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_NAR_BASE_URL.to_string()),
            api_key: std::env::var("INGEST_NAR_API_KEY").unwrap_or_default(),
            page_size: env_parse("INGEST_NAR_PAGE_SIZE", DEFAULT_NAR_PAGE_SIZE),
            idle_interval_hours: env_parse(
                "INGEST_NAR_IDLE_INTERVAL_HOURS",
                DEFAULT_NAR_IDLE_INTERVAL_HOURS,
            ),
            timeout_secs: env_parse("INGEST_NAR_TIMEOUT_SECS", DEFAULT_NAR_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.base_url.trim().is_empty() {
            anyhow::bail!("INGEST_NAR_BASE_URL cannot be empty when NAR sync is enabled");
        }
        if self.page_size == 0 {
            anyhow::bail!("INGEST_NAR_PAGE_SIZE must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("INGEST_NAR_TIMEOUT_SECS must be greater than 0");
        }
        if self.api_key.is_empty() {
            tracing::warn!("INGEST_NAR_API_KEY is not set - NAR requests will be rejected");
        }
        Ok(())
    }

    pub fn idle_interval(&self) -> chrono::Duration {
        let hours = i64::try_from(self.idle_interval_hours).unwrap_or(i64::MAX / 3_600_000);
        chrono::Duration::hours(hours)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_NAR_BASE_URL.to_string(),
            api_key: String::new(),
            page_size: DEFAULT_NAR_PAGE_SIZE,
            idle_interval_hours: DEFAULT_NAR_IDLE_INTERVAL_HOURS,
            timeout_secs: DEFAULT_NAR_TIMEOUT_SECS,
        }
    }
}

impl TraConfig {
    /// Load TRA configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let delimiter = match std::env::var("INGEST_TRA_DELIMITER") {
            Ok(raw) => parse_delimiter(&raw)?,
            Err(_) => b',',
        };

        let mut level_map = LevelRemap::default();
        if let Ok(overrides) = std::env::var("INGEST_TRA_LEVEL_MAP") {
            level_map.merge_str(&overrides)?;
        }

        Ok(Self {
            enabled: env_flag("INGEST_TRA_ENABLED", true),
            url: std::env::var("INGEST_TRA_URL").unwrap_or_else(|_| DEFAULT_TRA_URL.to_string()),
            refresh_interval_secs: env_parse(
                "INGEST_TRA_REFRESH_INTERVAL_SECS",
                DEFAULT_TRA_REFRESH_INTERVAL_SECS,
            ),
            timeout_secs: env_parse("INGEST_TRA_TIMEOUT_SECS", DEFAULT_TRA_TIMEOUT_SECS),
            delimiter,
            level_map,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.url.trim().is_empty() {
            anyhow::bail!("INGEST_TRA_URL cannot be empty when TRA sync is enabled");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("INGEST_TRA_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> chrono::Duration {
        let secs = i64::try_from(self.refresh_interval_secs).unwrap_or(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_TRA_URL.to_string(),
            refresh_interval_secs: DEFAULT_TRA_REFRESH_INTERVAL_SECS,
            timeout_secs: DEFAULT_TRA_TIMEOUT_SECS,
            delimiter: b',',
            level_map: LevelRemap::default(),
        }
    }
}

fn parse_delimiter(raw: &str) -> anyhow::Result<u8> {
    match raw {
        "\\t" | "tab" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => anyhow::bail!(
            "INGEST_TRA_DELIMITER must be a single ASCII character, got {:?}",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const INGEST_VARS: &[&str] = &[
        "INGEST_ENABLED",
        "INGEST_BATCH_CAP",
        "INGEST_SHARED_SECRET",
        "INGEST_NAR_ENABLED",
        "INGEST_NAR_BASE_URL",
        "INGEST_NAR_PAGE_SIZE",
        "INGEST_TRA_DELIMITER",
        "INGEST_TRA_LEVEL_MAP",
    ];

    fn clear_env() {
        for var in INGEST_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_ingest_config_default() {
        let config = IngestConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.batch_cap, 200);
        assert_eq!(config.tick_interval(), Duration::from_secs(300));
        assert_eq!(config.nar.idle_interval(), chrono::Duration::hours(6));
        assert_eq!(config.tra.refresh_interval(), chrono::Duration::days(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let config = IngestConfig {
            batch_cap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_source_skips_url_check() {
        let mut config = IngestConfig::default();
        config.tra.url = String::new();
        assert!(config.validate().is_err());
        config.tra.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(parse_delimiter("||").is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("INGEST_ENABLED", "true");
        std::env::set_var("INGEST_BATCH_CAP", "50");
        std::env::set_var("INGEST_SHARED_SECRET", "s3cret");
        std::env::set_var("INGEST_NAR_PAGE_SIZE", "25");
        std::env::set_var("INGEST_TRA_DELIMITER", "|");
        std::env::set_var("INGEST_TRA_LEVEL_MAP", "honorary=2");

        let config = IngestConfig::from_env().unwrap();
        assert!(config.enabled);
        assert_eq!(config.batch_cap, 50);
        assert_eq!(config.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.nar.page_size, 25);
        assert_eq!(config.tra.delimiter, b'|');
        assert_eq!(config.tra.level_map.lookup("Honorary"), Some(2));
        assert_eq!(config.tra.level_map.lookup("mentor"), Some(3));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_secret_is_unset() {
        clear_env();
        std::env::set_var("INGEST_SHARED_SECRET", "   ");
        let config = IngestConfig::from_env().unwrap();
        assert!(config.shared_secret.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_empty_nar_url() {
        clear_env();
        std::env::set_var("INGEST_NAR_BASE_URL", "");
        assert!(IngestConfig::from_env().is_err());
        clear_env();
    }
}
