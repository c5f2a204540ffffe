//! Main event loop driving the session and the message pipeline.
//!
//! [`run_event_loop`] is spawned as a tokio task by [`Node::start`].
//! After the initial bootstrap it uses `tokio::select!` to multiplex:
//!
//! 1. **Transport events**: peer membership changes and inbound frames.
//! 2. **Commands**: `SendMessage`, `GetStatus`, `Reconnect`, `Shutdown`.
//! 3. **Health tick**: reconnect after total disconnection.
//! 4. **Repair tick**: top up an under-connected relay set.
//! 5. **Retry deadline**: full bootstrap after `Failed`.
//! 6. **Replay deadline**: one-shot history replay to observers.
//! 7. **Shutdown signal**: graceful exit via `watch` channel, also taken
//!    when the owning `Node` is dropped.
//!
//! [`Node::start`]: crate::node::Node::start

use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use zeta_network::TransportEvent;
use zeta_types::ZetaError;

use crate::command::{NodeCommand, NodeStatus};
use crate::node::{NodeRuntime, NodeState};
use crate::pipeline::IngestOutcome;

// ---------------------------------------------------------------------------
// Event loop entry point
// ---------------------------------------------------------------------------

/// Runs the node event loop until shutdown is signalled.
pub(crate) async fn run_event_loop(mut rt: NodeRuntime) {
    tracing::info!(peer_id = %rt.transport.local_peer_id(), "node event loop started");

    let mut health_tick = delayed_interval(rt.config.health_check_interval);
    let mut repair_tick = delayed_interval(rt.config.repair_interval);
    let replay_at = Instant::now() + rt.config.replay_delay;
    let mut replayed = false;

    if let Err(e) = rt.session.bootstrap().await {
        tracing::warn!(%e, "initial bootstrap failed");
    }

    loop {
        let retry_at = rt.session.retry_deadline();

        tokio::select! {
            // ---------------------------------------------------------------
            // 1. Transport events.
            // ---------------------------------------------------------------
            event = rt.session.next_event() => {
                match event {
                    Some(event) => handle_transport_event(&mut rt, event),
                    None => {
                        tracing::error!("transport event stream closed -- exiting event loop");
                        break;
                    }
                }
            }

            // ---------------------------------------------------------------
            // 2. Commands from the daemon / tests.
            // ---------------------------------------------------------------
            Some(cmd) = rt.command_rx.recv() => {
                let should_shutdown = handle_command(cmd, &mut rt).await;
                if should_shutdown {
                    tracing::info!("shutdown command received -- exiting event loop");
                    break;
                }
            }

            // ---------------------------------------------------------------
            // 3. Total-disconnection health check.
            // ---------------------------------------------------------------
            _ = health_tick.tick() => {
                rt.session.health_check().await;
            }

            // ---------------------------------------------------------------
            // 4. Under-connection repair and stats log.
            // ---------------------------------------------------------------
            _ = repair_tick.tick() => {
                log_stats(&rt);
                rt.session.repair_tick().await;
            }

            // ---------------------------------------------------------------
            // 5. Scheduled retry after failure.
            // ---------------------------------------------------------------
            _ = sleep_until_opt(retry_at), if retry_at.is_some() => {
                rt.session.retry_if_due().await;
            }

            // ---------------------------------------------------------------
            // 6. Startup history replay.
            // ---------------------------------------------------------------
            _ = tokio::time::sleep_until(replay_at), if !replayed => {
                replayed = true;
                rt.pipeline.replay_history();
            }

            // ---------------------------------------------------------------
            // 7. Shutdown signal via watch channel.
            // ---------------------------------------------------------------
            changed = rt.shutdown_rx.changed() => {
                if changed.is_err() {
                    tracing::info!("node handle dropped -- exiting event loop");
                    break;
                }
                if *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received -- exiting event loop");
                    break;
                }
            }
        }
    }

    shutdown_sequence(rt).await;

    tracing::info!("node event loop exited");
}

/// An interval whose first tick is one `period` from now.
fn delayed_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Transport event handler
// ---------------------------------------------------------------------------

fn handle_transport_event(rt: &mut NodeRuntime, event: TransportEvent) {
    match event {
        TransportEvent::PeerConnected(peer) => rt.session.on_peer_connected(peer),
        TransportEvent::PeerDisconnected(peer) => rt.session.on_peer_disconnected(&peer),
        TransportEvent::MessageReceived { topic, data, source } => {
            if let IngestOutcome::Accepted(id) = rt.pipeline.ingest(&topic, &data, source) {
                tracing::trace!(%id, %topic, "message accepted");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command handler
// ---------------------------------------------------------------------------

/// Returns `true` if the event loop should exit.
async fn handle_command(cmd: NodeCommand, rt: &mut NodeRuntime) -> bool {
    match cmd {
        NodeCommand::SendMessage { content, topic, reply } => {
            let result = if rt.session.can_publish() {
                rt.pipeline.send_message(&content, topic.as_deref()).await
            } else {
                Err(ZetaError::PublishUnavailable {
                    reason: format!("session is {}", rt.session.state()),
                })
            };
            let _ = reply.send(result);
            false
        }

        NodeCommand::GetStatus { reply } => {
            let _ = reply.send(build_status(rt));
            false
        }

        NodeCommand::Reconnect { reply } => {
            let result = rt.session.reconnect().await;
            let _ = reply.send(result);
            false
        }

        NodeCommand::Shutdown => true,
    }
}

fn build_status(rt: &NodeRuntime) -> NodeStatus {
    NodeStatus {
        state: NodeState::Running,
        session: rt.session.state(),
        status: rt.session.status(),
        peer_id: rt.transport.local_peer_id(),
        active_relays: rt.session.active_relays(),
        topics: rt.session.subscribed_topics(),
        stats: rt.stats.snapshot(rt.session.active_relay_count(), Utc::now()),
        buffered_messages: rt.pipeline.buffer().len(),
    }
}

fn log_stats(rt: &NodeRuntime) {
    let snapshot = rt.stats.snapshot(rt.session.active_relay_count(), Utc::now());
    tracing::info!(
        state = %rt.session.state(),
        active_relays = snapshot.active_relay_count,
        messages_received = snapshot.messages_received,
        uptime = %snapshot.uptime_display(),
        "session stats"
    );
}

// ---------------------------------------------------------------------------
// Shutdown sequence
// ---------------------------------------------------------------------------

/// Flushes the store and stops the transport.
async fn shutdown_sequence(rt: NodeRuntime) {
    tracing::info!("running shutdown sequence");

    rt.pipeline.flush();
    let buffered = rt.pipeline.buffer().len();
    let messages_received = rt.stats.messages_received();
    let transport = rt.transport;
    drop(rt.pipeline);
    transport.shutdown().await;

    tracing::info!(messages_received, buffered, "shutdown complete");
}
