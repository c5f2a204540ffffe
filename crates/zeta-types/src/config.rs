//! Session configuration with defaults.
//!
//! The four connectivity constants of the session manager are exported
//! as `pub const` and used as [`SessionConfig::default`] values. The
//! remaining knobs tune the periodic repair task, the message pipeline
//! and history replay.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, ZetaError};

/// Maximum number of simultaneously connected relays.
pub const MAX_CONNECTIONS: usize = 10;

/// Delay before a full bootstrap retry after a failure.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5_000);

/// Interval of the total-disconnection health check.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(30_000);

/// Maximum number of records kept in the in-memory message buffer.
pub const MESSAGE_LIMIT: usize = 1000;

/// Interval of the under-connection repair task.
pub const REPAIR_INTERVAL: Duration = Duration::from_secs(60);

/// Relay count below which the session is considered degraded.
pub const HEALTHY_RELAY_THRESHOLD: usize = 3;

/// Pause between sequential connection attempts.
pub const CONNECT_PAUSE: Duration = Duration::from_millis(500);

/// Number of stored records replayed on startup.
pub const REPLAY_LIMIT: usize = 50;

/// Delay between startup and history replay.
pub const REPLAY_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the inbound deduplication cache.
pub const DEDUP_CACHE_SIZE: usize = 10_000;

/// Largest accepted inbound frame (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Largest accepted distance between a claimed timestamp and local time.
pub const MAX_TIMESTAMP_SKEW: Duration = Duration::from_secs(24 * 60 * 60);

/// How the node identity is obtained at startup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// A fresh keypair on every launch.
    #[default]
    Ephemeral,
    /// The keypair is stored in the settings table and reused.
    Persistent,
}

/// Session manager and message pipeline configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Upper bound on the active relay set.
    pub max_connections: usize,
    /// Delay before a full retry after `Failed`.
    pub reconnect_delay: Duration,
    /// Period of the empty-set health check.
    pub health_check_interval: Duration,
    /// In-memory buffer bound.
    pub message_limit: usize,
    /// Period of the under-connection repair task.
    pub repair_interval: Duration,
    /// Relay count at or above which the session is healthy.
    pub healthy_relay_threshold: usize,
    /// Pause after each connection attempt.
    pub connect_pause: Duration,
    /// Records replayed from the local store on startup.
    pub replay_limit: usize,
    /// Delay before the startup replay.
    pub replay_delay: Duration,
    /// Capacity of the inbound deduplication cache.
    pub dedup_cache_size: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Largest accepted timestamp skew for inbound envelopes.
    pub max_timestamp_skew: Duration,
    /// Ephemeral or persisted identity.
    pub identity_mode: IdentityMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            reconnect_delay: RECONNECT_DELAY,
            health_check_interval: HEALTH_CHECK_INTERVAL,
            message_limit: MESSAGE_LIMIT,
            repair_interval: REPAIR_INTERVAL,
            healthy_relay_threshold: HEALTHY_RELAY_THRESHOLD,
            connect_pause: CONNECT_PAUSE,
            replay_limit: REPLAY_LIMIT,
            replay_delay: REPLAY_DELAY,
            dedup_cache_size: DEDUP_CACHE_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            max_timestamp_skew: MAX_TIMESTAMP_SKEW,
            identity_mode: IdentityMode::Ephemeral,
        }
    }
}

impl SessionConfig {
    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::ConfigError`] naming the first zero-valued
    /// bound or interval.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("max_connections", self.max_connections),
            ("message_limit", self.message_limit),
            ("dedup_cache_size", self.dedup_cache_size),
            ("max_message_size", self.max_message_size),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ZetaError::ConfigError {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }

        let intervals = [
            ("reconnect_delay", self.reconnect_delay),
            ("health_check_interval", self.health_check_interval),
            ("repair_interval", self.repair_interval),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(ZetaError::ConfigError {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }

        if self.healthy_relay_threshold > self.max_connections {
            return Err(ZetaError::ConfigError {
                reason: format!(
                    "healthy_relay_threshold ({}) exceeds max_connections ({})",
                    self.healthy_relay_threshold, self.max_connections,
                ),
            });
        }

        Ok(())
    }
}
