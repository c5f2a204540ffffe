//! Session manager: relay discovery, connection lifecycle and repair.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──bootstrap()──▶ Connecting ──▶ Ready ⇄ Degraded
//!                                    │                    │
//!                                    ▼                    │ reconnect()
//!                                  Failed ◀───────────────┘
//!                                    │
//!                                    └──retry after reconnect_delay──▶ Connecting
//! ```
//!
//! - `Ready`: at least `healthy_relay_threshold` relays connected.
//! - `Degraded`: connected, but below the threshold (possibly zero
//!   after disconnects; the health check then reconnects).
//! - `Failed`: discovery or every connection attempt failed; a full
//!   bootstrap retry is scheduled.
//!
//! The active relay set is written only by [`on_peer_connected`] and
//! [`on_peer_disconnected`]. Peers that connect while the set is full
//! wait on standby and are promoted when a tracked relay drops. Connection attempts drain pending
//! transport events after each dial so the set is current before the
//! next attempt; inbound messages seen while draining are queued and
//! handed out first by [`next_event`].
//!
//! [`on_peer_connected`]: SessionManager::on_peer_connected
//! [`on_peer_disconnected`]: SessionManager::on_peer_disconnected
//! [`next_event`]: SessionManager::next_event

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use zeta_network::{RelayDirectory, SessionRegistrar, Transport, TransportEvent};
use zeta_types::config::SessionConfig;
use zeta_types::{PeerIdentity, RelayDescriptor, Result, SessionStatus, ZetaError};

use crate::observer::ObserverRegistry;
use crate::stats::SessionStats;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Connectivity state of the node's session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Nothing attempted yet.
    Uninitialized,
    /// A connection batch is in progress.
    Connecting,
    /// Connected to at least the healthy threshold of relays.
    Ready,
    /// Connected to fewer relays than the healthy threshold.
    Degraded,
    /// No relay reachable; a retry is scheduled.
    Failed,
}

impl SessionState {
    /// Returns `true` once a connection batch has succeeded and no
    /// failure has since been recorded.
    pub fn is_established(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Degraded => write!(f, "degraded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns the active relay set and drives connection attempts.
pub struct SessionManager {
    config: SessionConfig,
    topics: Vec<String>,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn RelayDirectory>,
    registrar: Arc<dyn SessionRegistrar>,
    observers: ObserverRegistry,
    stats: Arc<SessionStats>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    inbox: VecDeque<TransportEvent>,
    state: SessionState,
    candidates: Vec<RelayDescriptor>,
    active: BTreeSet<PeerIdentity>,
    standby: BTreeSet<PeerIdentity>,
    relay_peers: HashMap<String, PeerIdentity>,
    subscribed: BTreeSet<String>,
    registered: bool,
    retry_at: Option<Instant>,
}

impl SessionManager {
    /// Creates a manager in `Uninitialized` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        topics: Vec<String>,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        directory: Arc<dyn RelayDirectory>,
        registrar: Arc<dyn SessionRegistrar>,
        observers: ObserverRegistry,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            config,
            topics,
            transport,
            directory,
            registrar,
            observers,
            stats,
            events,
            inbox: VecDeque::new(),
            state: SessionState::Uninitialized,
            candidates: Vec::new(),
            active: BTreeSet::new(),
            standby: BTreeSet::new(),
            relay_peers: HashMap::new(),
            subscribed: BTreeSet::new(),
            registered: false,
            retry_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Coarse status as surfaced to observers.
    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Ready | SessionState::Degraded => SessionStatus::Ready,
            SessionState::Uninitialized | SessionState::Connecting => SessionStatus::Connecting,
            SessionState::Failed => SessionStatus::Error,
        }
    }

    /// Currently connected relays.
    pub fn active_relays(&self) -> Vec<PeerIdentity> {
        self.active.iter().cloned().collect()
    }

    /// Number of currently connected relays.
    pub fn active_relay_count(&self) -> usize {
        self.active.len()
    }

    /// Connected peers waiting for a free slot in the active set.
    pub fn standby_peers(&self) -> Vec<PeerIdentity> {
        self.standby.iter().cloned().collect()
    }

    /// Topics subscribed so far.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed.iter().cloned().collect()
    }

    /// Deadline of the scheduled full retry, if any.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Returns `true` when publishing can be attempted.
    pub fn can_publish(&self) -> bool {
        self.state.is_established() && !self.active.is_empty()
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    /// Next transport event: messages queued while draining first, then
    /// the live channel. Returns `None` once the transport is gone.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.inbox.pop_front() {
            return Some(event);
        }
        self.events.recv().await
    }

    /// Applies every transport event already queued, keeping inbound
    /// messages for [`next_event`](Self::next_event).
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                TransportEvent::PeerConnected(peer) => self.on_peer_connected(peer),
                TransportEvent::PeerDisconnected(peer) => self.on_peer_disconnected(&peer),
                message @ TransportEvent::MessageReceived { .. } => self.inbox.push_back(message),
            }
        }
    }

    /// Adds `peer` to the active set, or to standby when the set is at
    /// capacity.
    pub fn on_peer_connected(&mut self, peer: PeerIdentity) {
        if self.active.contains(&peer) || self.standby.contains(&peer) {
            return;
        }
        if self.active.len() >= self.config.max_connections {
            tracing::debug!(%peer, standby = self.standby.len() + 1, "relay set at capacity, peer on standby");
            self.standby.insert(peer);
            return;
        }
        tracing::info!(%peer, active = self.active.len() + 1, "relay connected");
        self.active.insert(peer);
        self.refresh_health();
        self.observers.relays(&self.active_relays());
    }

    /// Removes `peer` from the active set, promoting a standby peer into
    /// the freed slot.
    pub fn on_peer_disconnected(&mut self, peer: &PeerIdentity) {
        if self.standby.remove(peer) {
            tracing::debug!(%peer, "standby peer disconnected");
            return;
        }
        if !self.active.remove(peer) {
            return;
        }
        tracing::info!(%peer, active = self.active.len(), "relay disconnected");
        if let Some(next) = self.standby.pop_first() {
            tracing::info!(peer = %next, "standby peer promoted");
            self.active.insert(next);
        }
        self.refresh_health();
        self.observers.relays(&self.active_relays());
    }

    /// Re-evaluates `Ready` versus `Degraded` after a membership change.
    fn refresh_health(&mut self) {
        if self.state.is_established() {
            self.state = if self.active.len() >= self.config.healthy_relay_threshold {
                SessionState::Ready
            } else {
                SessionState::Degraded
            };
        }
    }

    fn set_state(&mut self, state: SessionState) {
        let before = self.status();
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "session state changed");
        }
        self.state = state;
        let after = self.status();
        if before != after || state == SessionState::Connecting {
            self.observers.status(after);
        }
    }

    // -----------------------------------------------------------------------
    // Bootstrap and connection
    // -----------------------------------------------------------------------

    /// Fetches relay candidates and connects to them.
    ///
    /// On a failed or empty fetch, or when no candidate is reachable,
    /// the session moves to `Failed` and a full retry is scheduled
    /// after `reconnect_delay`.
    pub async fn bootstrap(&mut self) -> Result<usize> {
        self.retry_at = None;
        self.set_state(SessionState::Connecting);

        match self.discover().await {
            Ok(()) => {}
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        }

        match self.connect_to_network().await {
            Ok(count) => Ok(count),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn discover(&mut self) -> Result<()> {
        let relays = self.directory.fetch_relays().await?;
        if relays.is_empty() {
            return Err(ZetaError::NoRelaysReachable {
                reason: "directory returned no online relays".into(),
            });
        }
        tracing::info!(candidates = relays.len(), "relay candidates fetched");
        self.candidates = relays;
        Ok(())
    }

    fn fail(&mut self, error: &ZetaError) {
        let delay = self.config.reconnect_delay;
        self.retry_at = Some(Instant::now() + delay);
        tracing::warn!(%error, retry_in_ms = delay.as_millis() as u64, "session failed, retry scheduled");
        self.set_state(SessionState::Failed);
    }

    /// Connects sequentially to the current candidates, in ranked order.
    ///
    /// Stops at `max_connections` relays or when candidates run out.
    /// Failed attempts are logged and skipped; candidates whose relay
    /// is already connected are skipped without dialing. Whenever the
    /// batch ends with any relay connected, missing topic subscriptions
    /// are made and the session is registered (best effort).
    ///
    /// Returns the number of relays connected by this batch.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::NoRelaysReachable`] if no relay is connected
    /// once the batch ends.
    pub async fn connect_to_network(&mut self) -> Result<usize> {
        if self.candidates.is_empty() {
            return Err(ZetaError::NoRelaysReachable {
                reason: "no relay candidates known".into(),
            });
        }
        if self.active.len() >= self.config.max_connections {
            tracing::debug!("relay set already at capacity");
            self.establish(&[]).await;
            return Ok(0);
        }

        self.set_state(SessionState::Connecting);

        let candidates = self.candidates.clone();
        let mut connected: Vec<String> = Vec::new();
        let mut attempts = 0usize;

        for relay in &candidates {
            self.drain_events();
            if self.active.len() >= self.config.max_connections {
                break;
            }
            if self
                .relay_peers
                .get(&relay.id)
                .is_some_and(|peer| self.active.contains(peer))
            {
                continue;
            }

            if attempts > 0 {
                tokio::time::sleep(self.config.connect_pause).await;
            }
            attempts += 1;

            tracing::info!(relay = %relay.id, address = %relay.address, "connecting to relay");
            match self.transport.connect(&relay.address).await {
                Ok(peer) => {
                    self.drain_events();
                    if self.active.contains(&peer) {
                        tracing::info!(relay = %relay.label(), %peer, "relay connection established");
                        self.relay_peers.insert(relay.id.clone(), peer);
                        connected.push(relay.id.clone());
                    } else {
                        tracing::debug!(relay = %relay.id, %peer, "connected peer not tracked");
                    }
                }
                Err(e) => {
                    tracing::warn!(relay = %relay.id, %e, "relay connection failed");
                }
            }
        }
        self.drain_events();

        if connected.is_empty() && self.active.is_empty() {
            return Err(ZetaError::NoRelaysReachable {
                reason: format!("all {attempts} connection attempts failed"),
            });
        }

        self.establish(&connected).await;
        tracing::info!(
            connected = connected.len(),
            active = self.active.len(),
            state = %self.state,
            "connection batch complete"
        );
        Ok(connected.len())
    }

    /// Settles a batch that left at least one relay connected.
    ///
    /// The session is registered with the relays this batch connected,
    /// or with the active peers if it was never registered before.
    async fn establish(&mut self, connected: &[String]) {
        self.stats.mark_connected(Utc::now());
        self.subscribe_topics().await;

        if !connected.is_empty() || !self.registered {
            let relay_ids: Vec<String> = if connected.is_empty() {
                self.active.iter().map(|peer| peer.to_string()).collect()
            } else {
                connected.to_vec()
            };
            let me = self.transport.local_peer_id();
            Self::register(Arc::clone(&self.registrar), me, &relay_ids).await;
            self.registered = true;
        }

        self.set_state(SessionState::Ready);
        self.refresh_health();
    }

    /// Subscribes every default topic not yet subscribed.
    async fn subscribe_topics(&mut self) {
        let missing: Vec<String> = self
            .topics
            .iter()
            .filter(|topic| !self.subscribed.contains(*topic))
            .cloned()
            .collect();
        for topic in missing {
            match self.transport.subscribe(&topic).await {
                Ok(()) => {
                    if self.subscribed.insert(topic.clone()) {
                        tracing::info!(%topic, "subscribed to topic");
                    }
                }
                Err(e) => tracing::warn!(%topic, %e, "topic subscription failed"),
            }
        }
    }

    async fn register(registrar: Arc<dyn SessionRegistrar>, me: PeerIdentity, relay_ids: &[String]) {
        if let Err(e) = registrar.register(&me, relay_ids).await {
            tracing::warn!(%e, "session registration failed");
        }
    }

    // -----------------------------------------------------------------------
    // Periodic tasks
    // -----------------------------------------------------------------------

    /// Reconnects when an established session has lost every relay.
    ///
    /// Returns `true` if a reconnection was attempted.
    pub async fn health_check(&mut self) -> bool {
        if !self.state.is_established() || !self.active.is_empty() {
            return false;
        }
        tracing::warn!("no active relay, reconnecting");
        if let Err(e) = self.connect_to_network().await {
            self.fail(&e);
        }
        true
    }

    /// Re-runs discovery and connection when an established session
    /// has fewer relays than the healthy threshold.
    ///
    /// Returns `true` if a repair was attempted.
    pub async fn repair_tick(&mut self) -> bool {
        if !self.state.is_established() || self.active.len() >= self.config.healthy_relay_threshold {
            return false;
        }
        tracing::info!(active = self.active.len(), "few relays connected, looking for more");
        match self.directory.fetch_relays().await {
            Ok(relays) if !relays.is_empty() => self.candidates = relays,
            Ok(_) => tracing::warn!("directory returned no online relays, keeping previous candidates"),
            Err(e) => tracing::warn!(%e, "relay refresh failed, keeping previous candidates"),
        }
        if let Err(e) = self.connect_to_network().await {
            self.fail(&e);
        }
        true
    }

    /// Runs the scheduled retry if its deadline has passed.
    pub async fn retry_if_due(&mut self) -> bool {
        match self.retry_at {
            Some(at) if Instant::now() >= at => {
                tracing::info!("retrying session bootstrap");
                let _ = self.bootstrap().await;
                true
            }
            _ => false,
        }
    }

    /// Manual reconnect: cancels any scheduled retry and bootstraps.
    pub async fn reconnect(&mut self) -> Result<usize> {
        tracing::info!("manual reconnect requested");
        self.bootstrap().await
    }
}
