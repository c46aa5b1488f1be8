//! Transport configuration.
//!
//! All fields have defaults matching the sensor-hub firmware, so an empty
//! YAML document is a valid configuration:
//!
//! ```yaml
//! channels:
//!   ctrl_out: 2
//!   notify_out: 3
//!   ctrl_in: 22
//!   notify_in: 23
//! slot_size: 4
//! completion_timeout_ms: 500
//! retry:
//!   max_attempts: 1000
//!   sleep_every: 100
//!   backoff_min_us: 1000
//!   backoff_max_us: 2000
//! ```

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mailbox::ChannelId;

/// Mailbox channels used by the sensor-hub transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    /// Outbound control requests.
    pub ctrl_out: ChannelId,
    /// Outbound notifications.
    pub notify_out: ChannelId,
    /// Inbound control acknowledgements.
    pub ctrl_in: ChannelId,
    /// Inbound notifications.
    pub notify_in: ChannelId,
}

impl Default for ChannelMap {
    fn default() -> Self {
        ChannelMap {
            ctrl_out: ChannelId(2),
            notify_out: ChannelId(3),
            ctrl_in: ChannelId(22),
            notify_in: ChannelId(23),
        }
    }
}

/// Backoff applied while the mailbox reports busy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Send attempts before giving up with a busy error.
    pub max_attempts: u32,
    /// Sleep after every this many busy attempts.
    pub sleep_every: u32,
    /// Lower bound of the sleep, in microseconds.
    pub backoff_min_us: u64,
    /// Upper bound of the sleep, in microseconds.
    pub backoff_max_us: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 1000,
            sleep_every: 100,
            backoff_min_us: 1000,
            backoff_max_us: 2000,
        }
    }
}

impl RetryPolicy {
    /// Whether a sleep follows busy attempt number `attempt` (1-based).
    pub fn sleeps_after(&self, attempt: u32) -> bool {
        attempt % self.sleep_every == 0
    }

    /// Pick a sleep duration inside the configured range.
    pub fn backoff(&self) -> Duration {
        let us = if self.backoff_min_us >= self.backoff_max_us {
            self.backoff_min_us
        } else {
            rand::thread_rng().gen_range(self.backoff_min_us..=self.backoff_max_us)
        };
        Duration::from_micros(us)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.sleep_every == 0 {
            return Err(ConfigError::Invalid("retry.sleep_every must be at least 1".into()));
        }
        if self.backoff_min_us > self.backoff_max_us {
            return Err(ConfigError::Invalid(format!(
                "retry backoff range is inverted: {}us > {}us",
                self.backoff_min_us, self.backoff_max_us
            )));
        }
        Ok(())
    }
}

/// Configuration for a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Channel assignments.
    pub channels: ChannelMap,
    /// Mailbox slot granularity in bytes.
    pub slot_size: usize,
    /// How long a transfer waits for its acknowledgement.
    pub completion_timeout_ms: u64,
    /// Busy backoff.
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            channels: ChannelMap::default(),
            slot_size: 4,
            completion_timeout_ms: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: TransportConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Completion deadline as a [`Duration`].
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_size == 0 {
            return Err(ConfigError::Invalid("slot_size must be non-zero".into()));
        }
        if self.completion_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "completion_timeout_ms must be non-zero".into(),
            ));
        }
        if self.channels.ctrl_in == self.channels.notify_in {
            return Err(ConfigError::Invalid(format!(
                "ctrl_in and notify_in share channel {}",
                self.channels.ctrl_in
            )));
        }
        self.retry.validate()
    }
}
