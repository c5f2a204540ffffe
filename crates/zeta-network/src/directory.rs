//! Relay directory client and session registrar.
//!
//! The directory publishes candidate relays at `GET {base}/network/relays`:
//!
//! ```json
//! {"relays":[{"id":"relay-01","name":"Relay EU","multiaddr":"/dns4/...",
//!             "endpoint":"wss://...","latency":42,"status":"online"}]}
//! ```
//!
//! [`rank_relays`] keeps online relays, orders them by ascending latency
//! (stable, so ties keep directory order) and truncates to the
//! connection cap.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use zeta_types::{PeerIdentity, RelayDescriptor, RelayStatus, Result, ZetaError};

use crate::config::NetworkConfig;

/// User agent sent with registrations.
pub const USER_AGENT: &str = concat!("zeta-node/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of ranked relay candidates.
#[async_trait]
pub trait RelayDirectory: Send + Sync {
    /// Returns online relays ordered by ascending latency, at most the
    /// connection cap. An empty list is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::DirectoryUnavailable`] if the directory
    /// cannot be reached or answers with malformed data.
    async fn fetch_relays(&self) -> Result<Vec<RelayDescriptor>>;
}

/// Best-effort announcement of a session to the network operator.
#[async_trait]
pub trait SessionRegistrar: Send + Sync {
    /// Registers `peer_id` as connected through `relay_ids`.
    async fn register(&self, peer_id: &PeerIdentity, relay_ids: &[String]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RelayListResponse {
    relays: Vec<RelayEntry>,
}

#[derive(Debug, Deserialize)]
struct RelayEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    multiaddr: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    latency: Option<f64>,
    #[serde(default)]
    status: Option<String>,
}

impl RelayEntry {
    fn into_descriptor(self) -> Option<RelayDescriptor> {
        let id = self.id.filter(|s| !s.is_empty())?;
        let address = self
            .multiaddr
            .filter(|s| !s.is_empty())
            .or_else(|| self.endpoint.filter(|s| !s.is_empty()))?;

        let observed_latency_ms = match self.latency {
            Some(ms) if ms.is_finite() && ms >= 0.0 => ms.round() as u64,
            _ => u64::MAX,
        };

        Some(RelayDescriptor {
            id,
            address,
            display_name: self.name,
            observed_latency_ms,
            status: self
                .status
                .as_deref()
                .map(RelayStatus::from_directory)
                .unwrap_or(RelayStatus::Offline),
        })
    }
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    peer_id: &'a str,
    connected_relays: &'a [String],
    user_agent: &'a str,
}

/// Parses a directory response body into descriptors, in directory
/// order. Entries without an id or any address are skipped.
///
/// # Errors
///
/// Returns [`ZetaError::DirectoryUnavailable`] if the body is not a JSON
/// object with a `relays` array.
pub fn parse_relay_list(body: &[u8]) -> Result<Vec<RelayDescriptor>> {
    let response: RelayListResponse =
        serde_json::from_slice(body).map_err(|e| ZetaError::DirectoryUnavailable {
            reason: format!("malformed relay list: {e}"),
        })?;

    let total = response.relays.len();
    let relays: Vec<RelayDescriptor> = response
        .relays
        .into_iter()
        .filter_map(RelayEntry::into_descriptor)
        .collect();

    if relays.len() < total {
        tracing::warn!(skipped = total - relays.len(), "skipped relay entries without id or address");
    }
    Ok(relays)
}

/// Filters to online relays, stable-sorts by latency and truncates to
/// `max`.
pub fn rank_relays(relays: Vec<RelayDescriptor>, max: usize) -> Vec<RelayDescriptor> {
    let mut online: Vec<RelayDescriptor> = relays
        .into_iter()
        .filter(|r| r.status == RelayStatus::Online)
        .collect();
    online.sort_by_key(|r| r.observed_latency_ms);
    online.truncate(max);
    online
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ZetaError::ConfigError {
            reason: format!("failed to build HTTP client: {e}"),
        })
}

// ---------------------------------------------------------------------------
// HttpDirectory
// ---------------------------------------------------------------------------

/// Relay directory backed by the network operator's HTTP API.
pub struct HttpDirectory {
    client: reqwest::Client,
    url: String,
    max_relays: usize,
}

impl HttpDirectory {
    /// Creates a client for `{config.directory_url}/network/relays`
    /// returning at most `max_relays` candidates.
    pub fn new(config: &NetworkConfig, max_relays: usize) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.http_timeout_secs))?,
            url: format!("{}/network/relays", config.directory_url.trim_end_matches('/')),
            max_relays,
        })
    }
}

#[async_trait]
impl RelayDirectory for HttpDirectory {
    async fn fetch_relays(&self) -> Result<Vec<RelayDescriptor>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ZetaError::DirectoryUnavailable {
                reason: format!("request to {} failed: {e}", self.url),
            })?
            .error_for_status()
            .map_err(|e| ZetaError::DirectoryUnavailable {
                reason: format!("directory returned an error: {e}"),
            })?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ZetaError::DirectoryUnavailable {
                reason: format!("failed to read relay list: {e}"),
            })?;

        let relays = parse_relay_list(&body)?;
        let fetched = relays.len();
        let ranked = rank_relays(relays, self.max_relays);
        tracing::info!(fetched, selected = ranked.len(), "relay directory fetched");
        Ok(ranked)
    }
}

// ---------------------------------------------------------------------------
// HttpRegistrar
// ---------------------------------------------------------------------------

/// Posts session registrations to `{base}/users/register`.
pub struct HttpRegistrar {
    client: reqwest::Client,
    url: String,
}

impl HttpRegistrar {
    /// Creates a registrar for `config.directory_url`.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.http_timeout_secs))?,
            url: format!("{}/users/register", config.directory_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SessionRegistrar for HttpRegistrar {
    async fn register(&self, peer_id: &PeerIdentity, relay_ids: &[String]) -> Result<()> {
        let body = RegistrationRequest {
            peer_id: peer_id.as_str(),
            connected_relays: relay_ids,
            user_agent: USER_AGENT,
        };

        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ZetaError::NetworkError {
                reason: format!("registration request failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| ZetaError::NetworkError {
                reason: format!("registration rejected: {e}"),
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
