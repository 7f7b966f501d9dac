//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default ceiling on checked-out resources.
pub const DEFAULT_CAPACITY: usize = 20;

/// Default acquire timeout.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound on a single wait slice inside `acquire`.
///
/// Releases wake waiters directly; this only bounds how long a waiter sleeps
/// before re-checking the pool on its own. Tuning it changes latency, never
/// correctness.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment prefix read by [`PoolConfig::from_env`].
pub const ENV_PREFIX: &str = "CISTERN_POOL";

/// Configuration for a [`ResourcePool`](crate::ResourcePool)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum number of concurrently checked-out resources
    pub capacity: usize,
    /// How long `acquire` waits for capacity before failing
    #[cfg_attr(
        feature = "serde",
        serde(rename = "acquire_timeout_secs", with = "duration_secs")
    )]
    pub acquire_timeout: Duration,
    /// Longest single wait slice while blocked in `acquire`
    #[cfg_attr(
        feature = "serde",
        serde(rename = "poll_interval_ms", with = "duration_millis")
    )]
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replace out-of-range values with their defaults.
    ///
    /// A zero capacity, timeout or poll interval is never an error: it is
    /// silently reset, the same way the pool's setters treat it.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            capacity: normalize_capacity(self.capacity),
            acquire_timeout: normalize_timeout(self.acquire_timeout),
            poll_interval: if self.poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                self.poll_interval
            },
        }
    }

    /// Reject out-of-range values instead of resetting them.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.capacity < 1 {
            return Err(Error::configuration("capacity must be at least 1"));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::configuration("acquire_timeout must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::configuration("poll_interval must be positive"));
        }
        Ok(())
    }

    /// Create configuration from `CISTERN_POOL_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Create configuration from `{prefix}_*` environment variables
    ///
    /// Reads `{prefix}_CAPACITY`, `{prefix}_ACQUIRE_TIMEOUT_SECS` and
    /// `{prefix}_POLL_INTERVAL_MS`. Missing, unparsable or non-positive values
    /// keep their defaults.
    #[must_use]
    pub fn from_env_with_prefix(prefix: &str) -> Self {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Like [`from_env_with_prefix`](Self::from_env_with_prefix), reading
    /// values through `lookup` instead of the process environment.
    pub fn from_lookup<L>(prefix: &str, lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(capacity) = read_positive(&lookup, &format!("{prefix}_CAPACITY")) {
            config.capacity = capacity as usize;
        }
        if let Some(secs) = read_positive(&lookup, &format!("{prefix}_ACQUIRE_TIMEOUT_SECS")) {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = read_positive(&lookup, &format!("{prefix}_POLL_INTERVAL_MS")) {
            config.poll_interval = Duration::from_millis(ms);
        }

        config
    }
}

pub(crate) fn normalize_capacity(capacity: usize) -> usize {
    if capacity < 1 {
        DEFAULT_CAPACITY
    } else {
        capacity
    }
}

pub(crate) fn normalize_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_ACQUIRE_TIMEOUT
    } else {
        timeout
    }
}

fn read_positive<L>(lookup: &L, key: &str) -> Option<u64>
where
    L: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 1 => Some(value as u64),
        _ => {
            tracing::debug!(key, value = %raw, "ignoring out-of-range pool setting");
            None
        }
    }
}

/// Serde helper for `Duration` as whole seconds (u64)
#[cfg(feature = "serde")]
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Serde helper for `Duration` as whole milliseconds (u64)
#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
