//! # SDK Configuration
//!
//! Recognized options: `appId` (required) and `watchTime` (sync interval in
//! milliseconds, default 500), plus runtime tuning that has sane defaults.
//!
//! Sources:
//! - [`WatchConfig::from_query`]: `appId=XXXX&watchTime=500`, optionally
//!   prefixed by a URL (`watch.js?appId=XXXX`)
//! - [`WatchConfig::from_env`]: `WATCH_*` environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::ConfigError;

/// Default sync interval.
pub const DEFAULT_WATCH_TIME: Duration = Duration::from_millis(500);

/// Default bound on one sync round-trip.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "memory://relay";

/// Complete SDK configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Application identifier. Required.
    pub app_id: Option<String>,
    /// Drain interval; also the freshness window.
    pub watch_time: Duration,
    /// Bound on one sync acknowledgement.
    pub sync_timeout: Duration,
    /// Evict entries idle for more than this many intervals. `None` keeps
    /// stale entries forever (they are skipped, not synced).
    pub evict_after_cycles: Option<u32>,
    /// Relay endpoint.
    pub relay_url: String,
    /// Directory for persisted identity.
    pub data_dir: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            watch_time: DEFAULT_WATCH_TIME,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            evict_after_cycles: None,
            relay_url: DEFAULT_RELAY_URL.to_string(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl WatchConfig {
    /// Configuration with an app id and defaults elsewhere.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_watch_time(mut self, watch_time: Duration) -> Self {
        self.watch_time = watch_time;
        self
    }

    #[must_use]
    pub fn with_sync_timeout(mut self, sync_timeout: Duration) -> Self {
        self.sync_timeout = sync_timeout;
        self
    }

    #[must_use]
    pub fn with_eviction(mut self, cycles: u32) -> Self {
        self.evict_after_cycles = Some(cycles);
        self
    }

    /// Parse script-style parameters: `appId=XXXX&watchTime=500`.
    ///
    /// Anything up to a `?` is ignored; unknown keys are ignored.
    pub fn from_query(query: &str) -> Result<Self, ConfigError> {
        let query = query.split_once('?').map_or(query, |(_, q)| q);
        let mut config = Self::default();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "appId" => config.app_id = non_blank(value),
                "watchTime" => config.watch_time = parse_millis(key, value)?,
                "syncTimeout" => config.sync_timeout = parse_millis(key, value)?,
                "evictAfter" => config.evict_after_cycles = Some(parse_number(key, value)?),
                "relay" => config.relay_url = value.to_string(),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WATCH_APP_ID`: Application id (required at init)
    /// - `WATCH_TIME_MS`: Sync interval (default: 500)
    /// - `WATCH_SYNC_TIMEOUT_MS`: Sync acknowledgement bound (default: 5000)
    /// - `WATCH_EVICT_AFTER_CYCLES`: Evict idle entries (default: never)
    /// - `WATCH_RELAY_URL`: Relay endpoint (default: memory://relay)
    /// - `WATCH_DATA_DIR`: Identity directory (default: ./data)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(app_id) = env::var("WATCH_APP_ID") {
            config.app_id = non_blank(&app_id);
        }
        if let Ok(value) = env::var("WATCH_TIME_MS") {
            config.watch_time = parse_millis("WATCH_TIME_MS", &value)?;
        }
        if let Ok(value) = env::var("WATCH_SYNC_TIMEOUT_MS") {
            config.sync_timeout = parse_millis("WATCH_SYNC_TIMEOUT_MS", &value)?;
        }
        if let Ok(value) = env::var("WATCH_EVICT_AFTER_CYCLES") {
            config.evict_after_cycles = Some(parse_number("WATCH_EVICT_AFTER_CYCLES", &value)?);
        }
        if let Ok(url) = env::var("WATCH_RELAY_URL") {
            config.relay_url = url;
        }
        if let Ok(dir) = env::var("WATCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Check the configuration before the SDK starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id().is_none() {
            return Err(ConfigError::MissingAppId);
        }
        if self.watch_time.is_zero() {
            return Err(ConfigError::InvalidWatchTime);
        }
        if self.sync_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "syncTimeout".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// The app id, if present and not blank.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_number::<u64>(key, value).map(Duration::from_millis)
}
