//! Pool configuration
//!
//! Every field is optional. Unset values (and zero capacities/durations, which
//! are treated as unset) fall back to the `DEFAULT_*` constants when a pool is
//! constructed. Durations serialize as milliseconds.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Idle connections older than this are closed instead of reused
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifetime of a pool entry before the sweeper tears it down (5 minutes)
pub const DEFAULT_ALIVE_DURATION: Duration = Duration::from_secs(300);

/// Connections dialed eagerly when a pool is built
pub const DEFAULT_INITIAL_CAPACITY: usize = 0;

/// Ceiling on simultaneously live connections per pool
pub const DEFAULT_MAX_CAPACITY: usize = 30;

/// Environment variable names read by [`PoolConfig::from_env`]
pub mod env {
    pub const INITIAL_CAPACITY: &str = "HOSTPOOL_INITIAL_CAPACITY";
    pub const MAX_CAPACITY: &str = "HOSTPOOL_MAX_CAPACITY";
    pub const IDLE_TIMEOUT_MS: &str = "HOSTPOOL_IDLE_TIMEOUT_MS";
    pub const ALIVE_DURATION_MS: &str = "HOSTPOOL_ALIVE_DURATION_MS";
    pub const ACQUIRE_TIMEOUT_MS: &str = "HOSTPOOL_ACQUIRE_TIMEOUT_MS";
}

/// Pool settings with per-field fallback to the documented defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections seeded when a pool is constructed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_capacity: Option<usize>,
    /// Maximum simultaneously live connections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<usize>,
    /// Idle eviction threshold
    #[serde(
        rename = "idle_timeout_ms",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_timeout: Option<Duration>,
    /// Lifetime of a pool entry
    #[serde(
        rename = "alive_duration_ms",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub alive_duration: Option<Duration>,
    /// How long `get` waits on a full pool before giving up (unset = forever)
    #[serde(
        rename = "acquire_timeout_ms",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub acquire_timeout: Option<Duration>,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `HOSTPOOL_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Unparseable values are logged and left unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            initial_capacity: parse_var(&lookup, env::INITIAL_CAPACITY),
            max_capacity: parse_var(&lookup, env::MAX_CAPACITY),
            idle_timeout: parse_var(&lookup, env::IDLE_TIMEOUT_MS).map(Duration::from_millis),
            alive_duration: parse_var(&lookup, env::ALIVE_DURATION_MS).map(Duration::from_millis),
            acquire_timeout: parse_var(&lookup, env::ACQUIRE_TIMEOUT_MS)
                .map(Duration::from_millis),
        }
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_alive_duration(mut self, alive: Duration) -> Self {
        self.alive_duration = Some(alive);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn effective_initial_capacity(&self) -> usize {
        self.initial_capacity.unwrap_or(DEFAULT_INITIAL_CAPACITY)
    }

    pub fn effective_max_capacity(&self) -> usize {
        self.max_capacity
            .filter(|cap| *cap > 0)
            .unwrap_or(DEFAULT_MAX_CAPACITY)
    }

    pub fn effective_idle_timeout(&self) -> Duration {
        self.idle_timeout
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT)
    }

    pub fn effective_alive_duration(&self) -> Duration {
        self.alive_duration
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_ALIVE_DURATION)
    }

    /// `None` means wait indefinitely for capacity
    pub fn effective_acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout.filter(|d| !d.is_zero())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, "Ignoring unparseable pool setting");
            None
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
