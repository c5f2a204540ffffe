//! In-memory fakes shared by the node integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use zeta_network::{RelayDirectory, SessionRegistrar, Transport, TransportEvent};
use zeta_types::{
    MessageEnvelope, MessageRecord, PeerIdentity, RelayDescriptor, RelayStatus, Result,
    SessionStatus, ZetaError,
};
use zeta_node::SessionObserver;

pub const LOCAL_PEER: &str = "12D3KooWLocalTestPeer";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An online relay reachable at `/memory/{id}`.
pub fn relay(id: &str, latency: u64) -> RelayDescriptor {
    RelayDescriptor {
        id: id.into(),
        address: address_of(id),
        display_name: Some(format!("Relay {id}")),
        observed_latency_ms: latency,
        status: RelayStatus::Online,
    }
}

pub fn relays(count: usize) -> Vec<RelayDescriptor> {
    (0..count).map(|i| relay(&format!("r{i}"), 10 + i as u64)).collect()
}

pub fn address_of(relay_id: &str) -> String {
    format!("/memory/{relay_id}")
}

/// The peer a [`FakeTransport`] reports for `address`.
pub fn peer_at(address: &str) -> PeerIdentity {
    PeerIdentity::new(format!("peer{}", address.replace('/', "-")))
}

/// Routes node logs to the test output; `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zeta_node=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a unique temporary directory for each test.
pub fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "zeta-node-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ))
}

pub fn frame(content: &str, author: &str, timestamp: DateTime<Utc>) -> Vec<u8> {
    MessageEnvelope::user_message(content, &PeerIdentity::new(author), timestamp)
        .encode()
        .unwrap()
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

/// Transport that connects instantly to any address not marked failing.
///
/// `connect` queues `PeerConnected` before returning, like the libp2p
/// transport does.
pub struct FakeTransport {
    local: PeerIdentity,
    events: mpsc::UnboundedSender<TransportEvent>,
    failing: Mutex<HashSet<String>>,
    dials: Mutex<Vec<String>>,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    reject_publish: AtomicBool,
    shutdowns: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            local: PeerIdentity::new(LOCAL_PEER),
            events: tx,
            failing: Mutex::new(HashSet::new()),
            dials: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            reject_publish: AtomicBool::new(false),
            shutdowns: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    pub fn fail_address(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn reject_publish(&self, reject: bool) {
        self.reject_publish.store(reject, Ordering::SeqCst);
    }

    /// Pushes an event as if the network produced it.
    pub fn inject(&self, event: TransportEvent) {
        self.events.send(event).unwrap();
    }

    pub fn deliver(&self, topic: &str, data: Vec<u8>, source: &str) {
        self.inject(TransportEvent::MessageReceived {
            topic: topic.into(),
            data,
            source: Some(PeerIdentity::new(source)),
        });
    }

    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, address: &str) -> Result<PeerIdentity> {
        self.dials.lock().unwrap().push(address.to_string());
        if self.failing.lock().unwrap().contains(address) {
            return Err(ZetaError::NetworkError {
                reason: format!("connection refused: {address}"),
            });
        }
        let peer = peer_at(address);
        let _ = self.events.send(TransportEvent::PeerConnected(peer.clone()));
        Ok(peer)
    }

    async fn disconnect(&self, peer: &PeerIdentity) -> Result<()> {
        let _ = self.events.send(TransportEvent::PeerDisconnected(peer.clone()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        if self.reject_publish.load(Ordering::SeqCst) {
            return Err(ZetaError::PublishUnavailable {
                reason: "no peers subscribed".into(),
            });
        }
        self.published.lock().unwrap().push((topic.to_string(), data));
        Ok(())
    }

    fn local_peer_id(&self) -> PeerIdentity {
        self.local.clone()
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// FakeDirectory
// ---------------------------------------------------------------------------

/// Directory serving a fixed, already ranked relay list.
pub struct FakeDirectory {
    relays: Mutex<Vec<RelayDescriptor>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl FakeDirectory {
    pub fn new(relays: Vec<RelayDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            relays: Mutex::new(relays),
            unavailable: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_relays(&self, relays: Vec<RelayDescriptor>) {
        *self.relays.lock().unwrap() = relays;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayDirectory for FakeDirectory {
    async fn fetch_relays(&self) -> Result<Vec<RelayDescriptor>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ZetaError::DirectoryUnavailable {
                reason: "HTTP 503".into(),
            });
        }
        Ok(self.relays.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// FakeRegistrar
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRegistrar {
    calls: Mutex<Vec<(PeerIdentity, Vec<String>)>>,
    fail: AtomicBool,
}

impl FakeRegistrar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let registrar = Self::default();
        registrar.fail.store(true, Ordering::SeqCst);
        Arc::new(registrar)
    }

    pub fn calls(&self) -> Vec<(PeerIdentity, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRegistrar for FakeRegistrar {
    async fn register(&self, peer_id: &PeerIdentity, relay_ids: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((peer_id.clone(), relay_ids.to_vec()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ZetaError::NetworkError {
                reason: "registration endpoint unreachable".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingObserver {
    statuses: Mutex<Vec<SessionStatus>>,
    relays: Mutex<Vec<Vec<PeerIdentity>>>,
    messages: Mutex<Vec<MessageRecord>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_relays(&self) -> Option<Vec<PeerIdentity>> {
        self.relays.lock().unwrap().last().cloned()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_status(&self, status: SessionStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn on_relays(&self, relays: &[PeerIdentity]) {
        self.relays.lock().unwrap().push(relays.to_vec());
    }

    fn on_message(&self, record: &MessageRecord) {
        self.messages.lock().unwrap().push(record.clone());
    }
}
