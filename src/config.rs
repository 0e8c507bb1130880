//! Cache Configuration
//!
//! Configuration comes from environment variables:
//!
//! | Variable           | Meaning                                 | Default                  |
//! |--------------------|-----------------------------------------|--------------------------|
//! | `REMOTE_ENABLED`   | `true` turns on the remote tier         | off                      |
//! | `REMOTE_URL`       | `redis://[user:pass@]host[:port][/db]`  | `redis://localhost:6379` |
//! | `DEFAULT_TTL`      | TTL in seconds when a caller gives none | `3600`                   |
//! | `SWEEPER_ENABLED`  | anything but `false` keeps it on        | on                       |
//! | `SWEEPER_SCHEDULE` | cron expression or `@every <interval>`  | `*/1 * * * *`            |

use crate::error::{CacheError, CacheResult};
use crate::remote::{RemoteEndpoint, RemoteOptions};
use crate::storage::Schedule;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_REMOTE_URL: &str = "redis://localhost:6379";
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SWEEPER_SCHEDULE: &str = "*/1 * * * *";

/// Settings for a [`TieredCache`](crate::cache::TieredCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub remote_enabled: bool,
    pub remote_url: String,
    /// TTL applied when a caller passes none, and to hydrated entries
    pub default_ttl: Duration,
    pub sweeper_enabled: bool,
    pub sweeper_schedule: String,
    pub remote: RemoteOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            default_ttl: DEFAULT_TTL,
            sweeper_enabled: true,
            sweeper_schedule: DEFAULT_SWEEPER_SCHEDULE.to_string(),
            remote: RemoteOptions::default(),
        }
    }
}

impl CacheConfig {
    /// A config with the remote tier enabled at `url`.
    pub fn with_remote(url: impl Into<String>) -> Self {
        Self {
            remote_enabled: true,
            remote_url: url.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// missing keys.
    ///
    /// # Example
    ///
    /// ```
    /// use cacheflow::config::CacheConfig;
    /// use std::time::Duration;
    ///
    /// let config = CacheConfig::from_lookup(|key| match key {
    ///     "DEFAULT_TTL" => Some("60".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.default_ttl, Duration::from_secs(60));
    /// assert!(!config.remote_enabled);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(enabled) = lookup("REMOTE_ENABLED") {
            config.remote_enabled = enabled.trim() == "true";
        }
        if let Some(url) = lookup("REMOTE_URL") {
            config.remote_url = url.trim().to_string();
        }
        if let Some(ttl) = lookup("DEFAULT_TTL") {
            let seconds: u64 = ttl.trim().parse().map_err(|_| {
                CacheError::Validation(format!("DEFAULT_TTL must be whole seconds, got '{}'", ttl))
            })?;
            config.default_ttl = Duration::from_secs(seconds);
        }
        if let Some(enabled) = lookup("SWEEPER_ENABLED") {
            config.sweeper_enabled = enabled.trim() != "false";
        }
        if let Some(schedule) = lookup("SWEEPER_SCHEDULE") {
            config.sweeper_schedule = schedule.trim().to_string();
        }

        Ok(config)
    }

    /// Checks the settings that matter for the enabled features.
    pub fn validate(&self) -> CacheResult<()> {
        if self.default_ttl.is_zero() {
            return Err(CacheError::Validation(
                "default TTL must be greater than zero".to_string(),
            ));
        }
        if self.remote_enabled {
            self.endpoint()?;
            if self.remote.command_timeout.is_zero() || self.remote.connect_timeout.is_zero() {
                return Err(CacheError::Validation(
                    "remote timeouts must be greater than zero".to_string(),
                ));
            }
        }
        if self.sweeper_enabled {
            self.schedule()?;
        }
        Ok(())
    }

    /// Parses `remote_url`.
    pub fn endpoint(&self) -> CacheResult<RemoteEndpoint> {
        RemoteEndpoint::parse(&self.remote_url)
    }

    /// Parses `sweeper_schedule`.
    pub fn schedule(&self) -> CacheResult<Schedule> {
        self.sweeper_schedule.parse()
    }

    /// Logs the effective configuration. The remote password is masked.
    pub fn log_summary(&self) {
        let remote = match self.endpoint() {
            Ok(endpoint) => endpoint.to_string(),
            Err(_) => "<invalid>".to_string(),
        };
        info!(
            remote_enabled = self.remote_enabled,
            remote_url = %remote,
            default_ttl_secs = self.default_ttl.as_secs(),
            sweeper_enabled = self.sweeper_enabled,
            sweeper_schedule = %self.sweeper_schedule,
            "Cache configuration"
        );
    }
}
