//! Controller configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the follow-up interval, in seconds.
pub const RECHECK_INTERVAL_ENV: &str = "INTEGRATOR_RECHECK_INTERVAL_SECS";

/// Environment variable overriding the shutdown timeout, in seconds.
pub const SHUTDOWN_TIMEOUT_ENV: &str = "INTEGRATOR_SHUTDOWN_TIMEOUT_SECS";

/// How the follow-up delay grows while a resource keeps failing.
///
/// A failure is a handler error, a store read error during dispatch or a
/// status update flagged with [`StatusUpdate::failed`](integrator_model::StatusUpdate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Always wait the recheck interval.
    #[default]
    Fixed,
    /// Double the interval per consecutive failure, up to `max_interval`.
    Exponential {
        #[serde(with = "duration_secs")]
        max_interval: Duration,
    },
}

impl RetryPolicy {
    /// Delay before the next check after `failures` consecutive failures.
    pub fn delay(&self, base: Duration, failures: u32) -> Duration {
        match self {
            Self::Fixed => base,
            Self::Exponential { max_interval } => {
                let factor = 2u32.saturating_pow(failures.min(16));
                base.saturating_mul(factor).min((*max_interval).max(base))
            }
        }
    }
}

/// Configuration for the integration controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Delay of the follow-up check armed after every dispatch.
    #[serde(with = "duration_secs", default = "default_recheck_interval")]
    pub recheck_interval: Duration,

    /// How long `stop` waits for in-flight work before aborting it.
    #[serde(with = "duration_secs", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,

    /// Name of the change-notification subscription.
    #[serde(default = "default_subscriber_name")]
    pub subscriber_name: String,

    /// Follow-up delay policy for failing resources.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            recheck_interval: default_recheck_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            subscriber_name: default_subscriber_name(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Set the recheck interval.
    #[must_use]
    pub const fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the subscription name.
    #[must_use]
    pub fn with_subscriber_name(mut self, name: impl Into<String>) -> Self {
        self.subscriber_name = name.into();
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load from a TOML file, or JSON when the extension is `.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] when the file cannot be read and
    /// [`Error::InvalidConfig`] when it cannot be parsed or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read(path.display().to_string(), e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("Failed to parse config: {e}")))?
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("Failed to parse config: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a variable is not a number.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a value is not a number.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(secs) = parse_secs(&lookup, RECHECK_INTERVAL_ENV)? {
            self.recheck_interval = secs;
        }
        if let Some(secs) = parse_secs(&lookup, SHUTDOWN_TIMEOUT_ENV)? {
            self.shutdown_timeout = secs;
        }
        Ok(self)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero intervals or an empty
    /// subscriber name.
    pub fn validate(&self) -> Result<()> {
        if self.recheck_interval.is_zero() {
            return Err(Error::invalid_config("recheck_interval must be positive"));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(Error::invalid_config("shutdown_timeout must be positive"));
        }
        if self.subscriber_name.trim().is_empty() {
            return Err(Error::invalid_config("subscriber_name must not be empty"));
        }
        if let RetryPolicy::Exponential { max_interval } = self.retry {
            if max_interval.is_zero() {
                return Err(Error::invalid_config("retry.max_interval must be positive"));
            }
        }
        Ok(())
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| Error::invalid_config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

const fn default_recheck_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_subscriber_name() -> String {
    "integration-controller".to_string()
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
