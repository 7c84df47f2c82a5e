//! Store and supervisor configuration.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file. Every setting except the database URL has a default.

use crate::task::adapters::postgres::StoreClock;
use mockable::DefaultClock;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const DATABASE_URL_KEY: &str = "TASKSTORE_DATABASE_URL";
const FALLBACK_DATABASE_URL_KEY: &str = "DATABASE_URL";
const POOL_SIZE_KEY: &str = "TASKSTORE_POOL_SIZE";
const RUN_MIGRATIONS_KEY: &str = "TASKSTORE_RUN_MIGRATIONS";
const CLOCK_KEY: &str = "TASKSTORE_CLOCK";
const STALE_TIMEOUT_KEY: &str = "TASKSTORE_STALE_TIMEOUT_SECS";
const SWEEP_INTERVAL_KEY: &str = "TASKSTORE_SWEEP_INTERVAL_SECS";

const DEFAULT_POOL_SIZE: NonZeroU32 = match NonZeroU32::new(8) {
    Some(size) => size,
    None => NonZeroU32::MIN,
};
const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No database URL was provided.
    #[error("missing database URL, set TASKSTORE_DATABASE_URL or DATABASE_URL")]
    MissingDatabaseUrl,

    /// A value could not be parsed.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Environment key.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure detail.
        reason: String,
    },

    /// The `.env` file exists but could not be read.
    #[error("failed to load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

/// Where the store reads "now" from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClockSource {
    /// Database server clock.
    #[default]
    Server,
    /// Application host clock.
    Application,
}

impl TryFrom<&str> for ClockSource {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "application" => Ok(Self::Application),
            other => Err(format!("expected 'server' or 'application', got '{other}'")),
        }
    }
}

/// Connection, migration and supervision settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    database_url: String,
    pool_size: NonZeroU32,
    run_migrations: bool,
    clock: ClockSource,
    stale_timeout: Duration,
    sweep_interval: Duration,
}

impl StoreConfig {
    /// Creates a configuration with defaults for everything but the URL.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool_size: DEFAULT_POOL_SIZE,
            run_migrations: false,
            clock: ClockSource::Server,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Loads configuration from the environment after reading `.env`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is missing, a value is malformed
    /// or an existing `.env` file cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            return Err(err.into());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is missing or a value is
    /// malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL_KEY)
            .or_else(|| lookup(FALLBACK_DATABASE_URL_KEY))
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let mut config = Self::new(database_url);
        if let Some(raw) = lookup(POOL_SIZE_KEY) {
            config.pool_size =
                parse_value(POOL_SIZE_KEY, &raw, |value| value.parse::<NonZeroU32>())?;
        }
        if let Some(raw) = lookup(RUN_MIGRATIONS_KEY) {
            config.run_migrations = parse_value(RUN_MIGRATIONS_KEY, &raw, parse_flag)?;
        }
        if let Some(raw) = lookup(CLOCK_KEY) {
            config.clock = parse_value(CLOCK_KEY, &raw, |value| ClockSource::try_from(value))?;
        }
        if let Some(raw) = lookup(STALE_TIMEOUT_KEY) {
            config.stale_timeout = parse_value(STALE_TIMEOUT_KEY, &raw, parse_seconds)?;
        }
        if let Some(raw) = lookup(SWEEP_INTERVAL_KEY) {
            config.sweep_interval = parse_value(SWEEP_INTERVAL_KEY, &raw, parse_seconds)?;
        }
        Ok(config)
    }

    /// Sets the maximum pool size.
    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: NonZeroU32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Enables or disables applying migrations on connect.
    #[must_use]
    pub const fn with_run_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    /// Selects the clock source.
    #[must_use]
    pub const fn with_clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the heartbeat age after which a task is stale.
    #[must_use]
    pub const fn with_stale_timeout(mut self, stale_timeout: Duration) -> Self {
        self.stale_timeout = stale_timeout;
        self
    }

    /// Sets the delay between supervisor sweeps.
    #[must_use]
    pub const fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Returns the database URL.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Returns the maximum pool size.
    #[must_use]
    pub const fn pool_size(&self) -> u32 {
        self.pool_size.get()
    }

    /// Returns whether migrations run on connect.
    #[must_use]
    pub const fn run_migrations(&self) -> bool {
        self.run_migrations
    }

    /// Returns the configured clock source.
    #[must_use]
    pub const fn clock(&self) -> ClockSource {
        self.clock
    }

    /// Returns the staleness timeout.
    #[must_use]
    pub const fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// Returns the sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Builds the store clock strategy for the configured source.
    #[must_use]
    pub fn store_clock(&self) -> StoreClock {
        match self.clock {
            ClockSource::Server => StoreClock::Server,
            ClockSource::Application => StoreClock::application(DefaultClock),
        }
    }
}

fn parse_value<T, E, P>(key: &'static str, raw: &str, parse: P) -> Result<T, ConfigError>
where
    P: FnOnce(&str) -> Result<T, E>,
    E: ToString,
{
    parse(raw.trim()).map_err(|err| ConfigError::InvalidValue {
        key,
        value: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    match raw.parse::<u64>() {
        Ok(0) => Err("must be greater than zero".to_owned()),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(err) => Err(err.to_string()),
    }
}
