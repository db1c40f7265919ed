//! Configuration management for the agent.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use stride_engine::{SyncOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_SYNC_INTERVAL};

const DEFAULT_DATABASE_URL: &str = "sqlite://stride.db";
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Agent configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// SQLite URL of the local store
    pub database_url: String,
    /// Base URL of the remote authority
    pub remote_url: String,
    /// Project key sent as `apikey`
    pub remote_api_key: Option<String>,
    /// Bearer token of the signed-in principal
    pub access_token: Option<String>,
    /// Principal whose queue is drained
    pub principal: Option<String>,
    pub sync_interval: Duration,
    pub probe_interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let database_url =
            non_empty("STRIDE_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let remote_url = non_empty("STRIDE_REMOTE_URL").ok_or(ConfigError::MissingRemoteUrl)?;

        let sync_interval = parse_interval(&non_empty, "STRIDE_SYNC_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_SYNC_INTERVAL);
        let probe_interval = parse_interval(&non_empty, "STRIDE_PROBE_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_PROBE_INTERVAL);
        let batch_size = parse_var(&non_empty, "STRIDE_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE);
        let max_retries =
            parse_var(&non_empty, "STRIDE_MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES);

        Ok(Self {
            database_url,
            remote_url,
            remote_api_key: non_empty("STRIDE_REMOTE_API_KEY"),
            access_token: non_empty("STRIDE_ACCESS_TOKEN"),
            principal: non_empty("STRIDE_PRINCIPAL"),
            sync_interval,
            probe_interval,
            batch_size,
            max_retries,
        })
    }

    /// Sync options with the configured sizes and default store policies.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::default()
            .with_batch_size(self.batch_size)
            .with_max_retries(self.max_retries)
            .with_sync_interval(self.sync_interval)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var })
        })
        .transpose()
}

fn parse_interval(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<u64>(lookup, var)? {
        Some(0) => Err(ConfigError::ZeroInterval { var }),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("remote_url", &self.remote_url)
            .field("remote_api_key", &self.remote_api_key.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("principal", &self.principal)
            .field("sync_interval", &self.sync_interval)
            .field("probe_interval", &self.probe_interval)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STRIDE_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("invalid number in {var}")]
    InvalidNumber { var: &'static str },

    #[error("{var} must be greater than zero")]
    ZeroInterval { var: &'static str },
}
