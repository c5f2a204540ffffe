//! Session manager integration tests against in-memory fakes.
//!
//! Runs on a paused tokio clock so connection pauses and retry delays
//! advance instantly and deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use zeta_network::gossip::{TOPIC_GLOBAL, TOPIC_SYSTEM_ANNOUNCEMENTS};
use zeta_network::TransportEvent;
use zeta_node::{ObserverRegistry, SessionManager, SessionState, SessionStats};
use zeta_types::config::SessionConfig;
use zeta_types::{PeerIdentity, RelayDescriptor, SessionStatus, ZetaError};

use common::{address_of, peer_at, relay, relays, FakeDirectory, FakeRegistrar, FakeTransport, RecordingObserver};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    session: SessionManager,
    transport: Arc<FakeTransport>,
    directory: Arc<FakeDirectory>,
    registrar: Arc<FakeRegistrar>,
    observer: Arc<RecordingObserver>,
    stats: Arc<SessionStats>,
}

fn harness_with(config: SessionConfig, candidates: Vec<RelayDescriptor>, registrar: Arc<FakeRegistrar>) -> Harness {
    common::init_tracing();
    let (transport, events) = FakeTransport::new();
    let directory = FakeDirectory::new(candidates);
    let observer = RecordingObserver::new();
    let stats = Arc::new(SessionStats::new());

    let mut observers = ObserverRegistry::new();
    observers.register(observer.clone());

    let session = SessionManager::new(
        config,
        vec![TOPIC_GLOBAL.to_string(), TOPIC_SYSTEM_ANNOUNCEMENTS.to_string()],
        transport.clone(),
        events,
        directory.clone(),
        registrar.clone(),
        observers,
        Arc::clone(&stats),
    );

    Harness {
        session,
        transport,
        directory,
        registrar,
        observer,
        stats,
    }
}

fn harness(candidates: Vec<RelayDescriptor>) -> Harness {
    harness_with(SessionConfig::default(), candidates, FakeRegistrar::new())
}

fn ids(relays: &[&str]) -> Vec<String> {
    relays.iter().map(|s| s.to_string()).collect()
}

// ===========================================================================
// Bootstrap
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn empty_directory_fails_and_schedules_retry() {
    let mut h = harness(Vec::new());

    let before = tokio::time::Instant::now();
    let err = h.session.bootstrap().await.unwrap_err();
    assert!(matches!(err, ZetaError::NoRelaysReachable { .. }));

    assert_eq!(h.session.state(), SessionState::Failed);
    assert_eq!(h.observer.statuses().last(), Some(&SessionStatus::Error));
    assert!(h.transport.dials().is_empty());

    let deadline = h.session.retry_deadline().unwrap();
    assert_eq!(deadline - before, Duration::from_secs(5));

    // Not due yet.
    assert!(!h.session.retry_if_due().await);
    assert_eq!(h.directory.fetches(), 1);

    h.directory.set_relays(relays(3));
    tokio::time::advance(Duration::from_secs(5)).await;

    assert!(h.session.retry_if_due().await);
    assert_eq!(h.directory.fetches(), 2);
    assert_eq!(h.session.state(), SessionState::Ready);
    assert_eq!(h.session.active_relay_count(), 3);
    assert!(h.session.retry_deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn directory_outage_fails_and_schedules_retry() {
    let mut h = harness(relays(3));
    h.directory.set_unavailable(true);

    let err = h.session.bootstrap().await.unwrap_err();
    assert!(matches!(err, ZetaError::DirectoryUnavailable { .. }));
    assert_eq!(h.session.state(), SessionState::Failed);
    assert!(h.session.retry_deadline().is_some());
}

#[tokio::test(start_paused = true)]
async fn partial_failures_register_only_connected_relays() {
    let mut h = harness(relays(5));
    h.transport.fail_address(&address_of("r1"));
    h.transport.fail_address(&address_of("r3"));

    let connected = h.session.bootstrap().await.unwrap();
    assert_eq!(connected, 3);
    assert_eq!(h.session.active_relay_count(), 3);
    assert_eq!(h.session.state(), SessionState::Ready);

    // Every candidate was attempted, in ranked order.
    let dialed: Vec<String> = (0..5).map(|i| address_of(&format!("r{i}"))).collect();
    assert_eq!(h.transport.dials(), dialed);

    let calls = h.registrar.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PeerIdentity::new(common::LOCAL_PEER));
    assert_eq!(calls[0].1, ids(&["r0", "r2", "r4"]));

    assert_eq!(
        h.session.subscribed_topics(),
        vec![TOPIC_GLOBAL.to_string(), TOPIC_SYSTEM_ANNOUNCEMENTS.to_string()]
    );
    assert!(h.stats.connected_since().is_some());
    assert_eq!(h.observer.statuses().first(), Some(&SessionStatus::Connecting));
    assert_eq!(h.observer.statuses().last(), Some(&SessionStatus::Ready));
    assert_eq!(h.observer.last_relays().map(|r| r.len()), Some(3));
}

#[tokio::test(start_paused = true)]
async fn every_candidate_failing_is_no_relays_reachable() {
    let mut h = harness(relays(3));
    for i in 0..3 {
        h.transport.fail_address(&address_of(&format!("r{i}")));
    }

    let err = h.session.bootstrap().await.unwrap_err();
    assert!(matches!(err, ZetaError::NoRelaysReachable { .. }));
    assert_eq!(h.session.state(), SessionState::Failed);
    assert!(h.registrar.calls().is_empty());
    assert!(h.stats.connected_since().is_none());
}

#[tokio::test(start_paused = true)]
async fn connection_batch_stops_at_max_connections() {
    let mut h = harness(relays(15));

    let connected = h.session.bootstrap().await.unwrap();
    assert_eq!(connected, 10);
    assert_eq!(h.session.active_relay_count(), 10);
    assert_eq!(h.transport.dials().len(), 10);
    assert_eq!(h.registrar.calls()[0].1.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn below_threshold_is_degraded_but_publishable() {
    let mut h = harness(relays(2));

    h.session.bootstrap().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Degraded);
    assert_eq!(h.session.status(), SessionStatus::Ready);
    assert!(h.session.can_publish());
}

#[tokio::test(start_paused = true)]
async fn registration_failure_does_not_fail_the_session() {
    let mut h = harness_with(SessionConfig::default(), relays(3), FakeRegistrar::failing());

    assert_eq!(h.session.bootstrap().await.unwrap(), 3);
    assert_eq!(h.session.state(), SessionState::Ready);
    assert_eq!(h.registrar.calls().len(), 1);
}

// ===========================================================================
// Active set membership
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn peer_events_never_exceed_max_connections() {
    let config = SessionConfig {
        max_connections: 3,
        healthy_relay_threshold: 2,
        ..SessionConfig::default()
    };
    let mut h = harness_with(config, relays(3), FakeRegistrar::new());
    h.session.bootstrap().await.unwrap();
    assert_eq!(h.session.active_relay_count(), 3);

    // An inbound peer beyond the cap waits on standby.
    let inbound = PeerIdentity::new("inbound");
    h.session.on_peer_connected(inbound.clone());
    assert_eq!(h.session.active_relay_count(), 3);
    assert!(!h.session.active_relays().contains(&inbound));
    assert_eq!(h.session.standby_peers(), vec![inbound.clone()]);

    // A repeated event for a tracked peer changes nothing.
    h.session.on_peer_connected(peer_at(&address_of("r0")));
    assert_eq!(h.session.active_relay_count(), 3);

    // The freed slot goes to the standby peer.
    h.session.on_peer_disconnected(&peer_at(&address_of("r0")));
    assert_eq!(h.session.active_relay_count(), 3);
    assert!(h.session.active_relays().contains(&inbound));
    assert!(h.session.standby_peers().is_empty());
    assert_eq!(h.session.state(), SessionState::Ready);
    assert_eq!(h.observer.last_relays().map(|r| r.len()), Some(3));

    h.session.on_peer_connected(inbound);
    assert_eq!(h.session.active_relay_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn standby_peer_that_leaves_is_forgotten() {
    let config = SessionConfig {
        max_connections: 2,
        healthy_relay_threshold: 2,
        ..SessionConfig::default()
    };
    let mut h = harness_with(config, relays(2), FakeRegistrar::new());
    h.session.bootstrap().await.unwrap();

    let extra = PeerIdentity::new("extra");
    h.session.on_peer_connected(extra.clone());
    h.session.on_peer_disconnected(&extra);
    assert!(h.session.standby_peers().is_empty());

    h.session.on_peer_disconnected(&peer_at(&address_of("r1")));
    assert_eq!(h.session.active_relay_count(), 1);
    assert_eq!(h.session.state(), SessionState::Degraded);
}

#[tokio::test(start_paused = true)]
async fn inbound_only_session_still_subscribes_and_registers() {
    let mut h = harness(relays(3));
    for i in 0..3 {
        h.transport.fail_address(&address_of(&format!("r{i}")));
    }
    h.transport
        .inject(TransportEvent::PeerConnected(PeerIdentity::new("inbound")));

    assert_eq!(h.session.bootstrap().await.unwrap(), 0);
    assert_eq!(h.session.state(), SessionState::Degraded);
    assert!(h.session.can_publish());

    let topics = h.session.subscribed_topics();
    assert_eq!(topics.len(), 2);
    assert!(topics.contains(&TOPIC_GLOBAL.to_string()));
    assert!(topics.contains(&TOPIC_SYSTEM_ANNOUNCEMENTS.to_string()));
    assert_eq!(h.transport.subscriptions().len(), 2);

    let calls = h.registrar.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, ids(&["inbound"]));
    assert!(h.stats.connected_since().is_some());

    // A second batch with nothing new neither resubscribes nor re-registers.
    h.session.bootstrap().await.unwrap();
    assert_eq!(h.transport.subscriptions().len(), 2);
    assert_eq!(h.registrar.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_below_threshold_degrades() {
    let mut h = harness(relays(3));
    h.session.bootstrap().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Ready);

    h.session.on_peer_disconnected(&peer_at(&address_of("r2")));
    assert_eq!(h.session.state(), SessionState::Degraded);
    assert_eq!(h.observer.last_relays().map(|r| r.len()), Some(2));

    // Unknown peers are ignored.
    h.session.on_peer_disconnected(&PeerIdentity::new("stranger"));
    assert_eq!(h.session.active_relay_count(), 2);
}

// ===========================================================================
// Health check
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn health_check_with_active_relays_does_nothing() {
    let mut h = harness(relays(3));
    h.session.bootstrap().await.unwrap();
    let dials = h.transport.dials().len();

    assert!(!h.session.health_check().await);
    assert_eq!(h.transport.dials().len(), dials);
    assert_eq!(h.directory.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn health_check_reconnects_after_total_loss() {
    let mut h = harness(relays(3));
    h.session.bootstrap().await.unwrap();

    for i in 0..3 {
        h.session.on_peer_disconnected(&peer_at(&address_of(&format!("r{i}"))));
    }
    assert_eq!(h.session.active_relay_count(), 0);
    assert!(!h.session.can_publish());

    assert!(h.session.health_check().await);
    assert_eq!(h.session.active_relay_count(), 3);
    assert_eq!(h.session.state(), SessionState::Ready);
    // Candidates are reused; no refetch.
    assert_eq!(h.directory.fetches(), 1);
    assert_eq!(h.transport.dials().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn failed_health_check_schedules_retry() {
    let mut h = harness(relays(1));
    h.session.bootstrap().await.unwrap();

    h.transport.fail_address(&address_of("r0"));
    h.session.on_peer_disconnected(&peer_at(&address_of("r0")));

    assert!(h.session.health_check().await);
    assert_eq!(h.session.state(), SessionState::Failed);
    assert!(h.session.retry_deadline().is_some());

    // Health checks only act on established sessions.
    assert!(!h.session.health_check().await);
}

// ===========================================================================
// Repair and reconnect
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn repair_tops_up_under_connected_session() {
    let mut h = harness(relays(2));
    h.session.bootstrap().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Degraded);

    h.directory.set_relays(vec![relay("r0", 10), relay("r1", 11), relay("r5", 12), relay("r6", 13)]);
    assert!(h.session.repair_tick().await);

    assert_eq!(h.directory.fetches(), 2);
    assert_eq!(h.session.active_relay_count(), 4);
    assert_eq!(h.session.state(), SessionState::Ready);

    // Already-connected relays were not dialed again.
    assert_eq!(h.transport.dials().len(), 4);
    assert_eq!(h.registrar.calls()[1].1, ids(&["r5", "r6"]));
}

#[tokio::test(start_paused = true)]
async fn repair_keeps_candidates_when_directory_is_down() {
    let mut h = harness(relays(2));
    h.session.bootstrap().await.unwrap();

    h.directory.set_unavailable(true);
    assert!(h.session.repair_tick().await);
    assert_eq!(h.session.active_relay_count(), 2);
    assert_eq!(h.session.state(), SessionState::Degraded);
}

#[tokio::test(start_paused = true)]
async fn repair_skips_healthy_session() {
    let mut h = harness(relays(3));
    h.session.bootstrap().await.unwrap();

    assert!(!h.session.repair_tick().await);
    assert_eq!(h.directory.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_cancels_scheduled_retry() {
    let mut h = harness(Vec::new());
    assert!(h.session.bootstrap().await.is_err());
    assert!(h.session.retry_deadline().is_some());

    h.directory.set_relays(relays(3));
    assert_eq!(h.session.reconnect().await.unwrap(), 3);
    assert!(h.session.retry_deadline().is_none());
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn connect_pause_separates_attempts() {
    let mut h = harness(relays(3));

    let before = tokio::time::Instant::now();
    h.session.bootstrap().await.unwrap();
    // Two pauses between three attempts.
    assert_eq!(tokio::time::Instant::now() - before, Duration::from_millis(1000));
}
