//! Network configuration for the Zeta libp2p layer and directory client.
//!
//! All values have documented defaults. Validation ensures no
//! zero-valued timeouts, a usable directory URL and a non-empty topic
//! set at startup.

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use zeta_types::config::MAX_MESSAGE_SIZE;
use zeta_types::{Result, ZetaError};

use crate::gossip::{TOPIC_GLOBAL, TOPIC_SYSTEM_ANNOUNCEMENTS};

/// Default relay directory API base.
pub const DEFAULT_DIRECTORY_URL: &str = "https://zetanetwork.org/api/v1";

/// Network-layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Base URL of the relay directory and registration API.
    ///
    /// Default: [`DEFAULT_DIRECTORY_URL`].
    pub directory_url: String,

    /// Multiaddr on which this node listens for incoming connections.
    ///
    /// Default: `/ip4/0.0.0.0/tcp/0` (OS-assigned port on all interfaces).
    #[serde(with = "multiaddr_serde")]
    pub listen_addr: Multiaddr,

    /// Seconds before a directory or registration request is aborted.
    pub http_timeout_secs: u64,

    /// Seconds before an outbound dial attempt is aborted.
    pub dial_timeout_secs: u64,

    /// Seconds before an idle connection is closed by the swarm.
    pub idle_timeout_secs: u64,

    /// Largest gossip frame accepted or published, in bytes.
    pub max_transmit_size: usize,

    /// Topics subscribed after every successful connection batch.
    pub topics: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let mut listen_addr = Multiaddr::empty();
        listen_addr.push(Protocol::Ip4(std::net::Ipv4Addr::UNSPECIFIED));
        listen_addr.push(Protocol::Tcp(0));

        Self {
            directory_url: DEFAULT_DIRECTORY_URL.into(),
            listen_addr,
            http_timeout_secs: 10,
            dial_timeout_secs: 10,
            idle_timeout_secs: 60,
            max_transmit_size: MAX_MESSAGE_SIZE,
            topics: vec![TOPIC_GLOBAL.into(), TOPIC_SYSTEM_ANNOUNCEMENTS.into()],
        }
    }
}

impl NetworkConfig {
    /// Returns the first configured topic, used when a send names none.
    pub fn default_topic(&self) -> &str {
        self.topics.first().map(String::as_str).unwrap_or(TOPIC_GLOBAL)
    }

    /// Validates all configuration values.
    ///
    /// Returns `Err(ZetaError::ConfigError)` if any value is outside
    /// its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if !(self.directory_url.starts_with("http://") || self.directory_url.starts_with("https://")) {
            return Err(ZetaError::ConfigError {
                reason: format!("directory_url must be an http(s) URL, got '{}'", self.directory_url),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ZetaError::ConfigError {
                reason: "http_timeout_secs must be greater than 0".into(),
            });
        }
        if self.dial_timeout_secs == 0 {
            return Err(ZetaError::ConfigError {
                reason: "dial_timeout_secs must be greater than 0".into(),
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(ZetaError::ConfigError {
                reason: "idle_timeout_secs must be greater than 0".into(),
            });
        }
        if self.max_transmit_size == 0 {
            return Err(ZetaError::ConfigError {
                reason: "max_transmit_size must be greater than 0".into(),
            });
        }
        if self.topics.is_empty() {
            return Err(ZetaError::ConfigError {
                reason: "at least one topic must be configured".into(),
            });
        }
        if self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(ZetaError::ConfigError {
                reason: "topic names must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod multiaddr_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &Multiaddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Multiaddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
