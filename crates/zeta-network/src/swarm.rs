//! libp2p gossipsub implementation of [`Transport`].
//!
//! [`GossipTransport`] is a cheap handle. The libp2p `Swarm` itself is
//! owned by a background task that multiplexes swarm events with
//! commands sent from the handle, replying on oneshot channels.
//! Connection and gossip events are mapped into [`TransportEvent`]s and
//! sent on the channel returned by [`GossipTransport::spawn`].
//!
//! A `PeerConnected` event is always emitted before the matching
//! `connect` call resolves.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{ConnectionId, NetworkBehaviour, SwarmEvent};
use libp2p::{gossipsub, identify, identity, noise, tcp, yamux, Multiaddr, PeerId, Swarm};
use tokio::sync::{mpsc, oneshot};

use zeta_types::{PeerIdentity, ZetaError};

use crate::config::NetworkConfig;
use crate::events::TransportEvent;
use crate::gossip;
use crate::identity::{parse_peer_id, peer_identity};
use crate::transport::Transport;

/// Convenience alias to avoid shadowing `std::result::Result`
/// which the `#[derive(NetworkBehaviour)]` macro requires.
type BResult<T> = std::result::Result<T, ZetaError>;

type Reply<T> = oneshot::Sender<BResult<T>>;

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

/// Combined libp2p behaviour: gossipsub for pub/sub, identify so relays
/// learn our addresses and protocols.
#[derive(NetworkBehaviour)]
pub struct ZetaBehaviour {
    /// Topic pub/sub.
    pub gossip: gossipsub::Behaviour,
    /// Peer information exchange.
    pub identify: identify::Behaviour,
}

/// Builds the combined behaviour for `keypair`.
fn build_behaviour(keypair: &identity::Keypair, max_transmit_size: usize) -> BResult<ZetaBehaviour> {
    Ok(ZetaBehaviour {
        gossip: gossip::build_gossip_behaviour(keypair, max_transmit_size)?,
        identify: gossip::build_identify_behaviour(keypair),
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SwarmCommand {
    Dial {
        address: Multiaddr,
        reply: Reply<PeerIdentity>,
    },
    Disconnect {
        peer: PeerId,
        reply: Reply<()>,
    },
    Subscribe {
        topic: String,
        reply: Reply<()>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    Listeners {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// GossipTransport
// ---------------------------------------------------------------------------

/// Handle to a libp2p swarm running in its own task.
#[derive(Clone)]
pub struct GossipTransport {
    commands: mpsc::UnboundedSender<SwarmCommand>,
    local_peer_id: PeerId,
    dial_timeout: Duration,
}

impl GossipTransport {
    /// Builds the swarm, starts listening on `config.listen_addr` and
    /// spawns the swarm task on the current tokio runtime.
    ///
    /// Returns `(transport, event_receiver)`.
    ///
    /// # Errors
    ///
    /// Returns `ZetaError::ConfigError` for an invalid configuration and
    /// `ZetaError::NetworkError` if transport, behaviour or listener
    /// construction fails.
    pub fn spawn(
        config: &NetworkConfig,
        keypair: identity::Keypair,
    ) -> BResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        config.validate()?;

        let max_transmit_size = config.max_transmit_size;
        let idle_timeout = Duration::from_secs(config.idle_timeout_secs);

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| ZetaError::NetworkError {
                reason: format!("failed to configure TCP transport: {e}"),
            })?
            .with_dns()
            .map_err(|e| ZetaError::NetworkError {
                reason: format!("failed to configure DNS transport: {e}"),
            })?
            .with_behaviour(|key| {
                build_behaviour(key, max_transmit_size)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| ZetaError::NetworkError {
                reason: format!("failed to build network behaviour: {e}"),
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        swarm
            .listen_on(config.listen_addr.clone())
            .map_err(|e| ZetaError::NetworkError {
                reason: format!("failed to start listening on {}: {e}", config.listen_addr),
            })?;

        let local_peer_id = *swarm.local_peer_id();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task = SwarmTask {
            swarm,
            events: event_tx,
            pending_dials: HashMap::new(),
        };
        tokio::spawn(task.run(cmd_rx));

        tracing::info!(peer_id = %local_peer_id, "gossip transport started");

        Ok((
            Self {
                commands: cmd_tx,
                local_peer_id,
                dial_timeout: Duration::from_secs(config.dial_timeout_secs),
            },
            event_rx,
        ))
    }

    /// Returns the addresses the swarm is currently listening on.
    pub async fn listeners(&self) -> Vec<Multiaddr> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(SwarmCommand::Listeners { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    async fn request<T>(&self, label: &str, build: impl FnOnce(Reply<T>) -> SwarmCommand) -> BResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).map_err(|_| ZetaError::NetworkError {
            reason: format!("{label}: transport task has stopped"),
        })?;
        rx.await.map_err(|_| ZetaError::NetworkError {
            reason: format!("{label}: transport task dropped the request"),
        })?
    }
}

#[async_trait]
impl Transport for GossipTransport {
    async fn connect(&self, address: &str) -> BResult<PeerIdentity> {
        let address: Multiaddr = address.parse().map_err(|e| ZetaError::NetworkError {
            reason: format!("invalid relay address '{address}': {e}"),
        })?;

        match tokio::time::timeout(
            self.dial_timeout,
            self.request("dial", |reply| SwarmCommand::Dial { address, reply }),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ZetaError::NetworkError {
                reason: format!("dial timed out after {}s", self.dial_timeout.as_secs()),
            }),
        }
    }

    async fn disconnect(&self, peer: &PeerIdentity) -> BResult<()> {
        let peer = parse_peer_id(peer)?;
        self.request("disconnect", |reply| SwarmCommand::Disconnect { peer, reply })
            .await
    }

    async fn subscribe(&self, topic: &str) -> BResult<()> {
        let topic = topic.to_string();
        self.request("subscribe", |reply| SwarmCommand::Subscribe { topic, reply })
            .await
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> BResult<()> {
        let unavailable = || ZetaError::PublishUnavailable {
            reason: "transport task has stopped".into(),
        };
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SwarmCommand::Publish {
                topic: topic.to_string(),
                data,
                reply,
            })
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())?
    }

    fn local_peer_id(&self) -> PeerIdentity {
        peer_identity(&self.local_peer_id)
    }

    async fn shutdown(&self) {
        let _ = self.commands.send(SwarmCommand::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// SwarmTask
// ---------------------------------------------------------------------------

struct SwarmTask {
    swarm: Swarm<ZetaBehaviour>,
    events: mpsc::UnboundedSender<TransportEvent>,
    pending_dials: HashMap<ConnectionId, Reply<PeerIdentity>>,
}

impl SwarmTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SwarmCommand>) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                command = commands.recv() => match command {
                    Some(SwarmCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }
        tracing::info!("gossip transport stopped");
    }

    fn handle_command(&mut self, command: SwarmCommand) {
        match command {
            SwarmCommand::Dial { address, reply } => self.dial(address, reply),
            SwarmCommand::Disconnect { peer, reply } => {
                let result = self
                    .swarm
                    .disconnect_peer_id(peer)
                    .map_err(|()| ZetaError::NetworkError {
                        reason: format!("peer {peer} is not connected"),
                    });
                let _ = reply.send(result);
            }
            SwarmCommand::Subscribe { topic, reply } => {
                let _ = reply.send(gossip::subscribe(&mut self.swarm.behaviour_mut().gossip, &topic));
            }
            SwarmCommand::Publish { topic, data, reply } => {
                let _ = reply.send(gossip::publish(&mut self.swarm.behaviour_mut().gossip, &topic, data));
            }
            SwarmCommand::Listeners { reply } => {
                let _ = reply.send(self.swarm.listeners().cloned().collect());
            }
            SwarmCommand::Shutdown => {}
        }
    }

    fn dial(&mut self, address: Multiaddr, reply: Reply<PeerIdentity>) {
        let target = address.iter().find_map(|p| match p {
            Protocol::P2p(peer) => Some(peer),
            _ => None,
        });

        if let Some(peer) = target {
            if self.swarm.is_connected(&peer) {
                tracing::debug!(%peer, "already connected, dial skipped");
                let _ = reply.send(Ok(peer_identity(&peer)));
                return;
            }
        }

        let opts = DialOpts::unknown_peer_id().address(address.clone()).build();
        let connection_id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                tracing::debug!(%address, ?connection_id, "dialing relay");
                self.pending_dials.insert(connection_id, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(ZetaError::NetworkError {
                    reason: format!("failed to dial {address}: {e}"),
                }));
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<ZetaBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "new listen address");
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, ?endpoint, num_established, "connection established");
                if num_established.get() == 1 {
                    self.emit(TransportEvent::PeerConnected(peer_identity(&peer_id)));
                }
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(peer_identity(&peer_id)));
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, ?cause, num_established, "connection closed");
                if num_established == 0 {
                    self.emit(TransportEvent::PeerDisconnected(peer_identity(&peer_id)));
                }
            }

            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
            } => {
                tracing::warn!(?peer_id, %error, "outgoing connection error");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(ZetaError::NetworkError {
                        reason: format!("dial failed: {error}"),
                    }));
                }
            }

            SwarmEvent::Behaviour(ZetaBehaviourEvent::Gossip(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                tracing::debug!(
                    topic = %message.topic,
                    %propagation_source,
                    bytes = message.data.len(),
                    "gossip message received"
                );
                self.emit(TransportEvent::MessageReceived {
                    topic: message.topic.into_string(),
                    data: message.data,
                    source: message.source.as_ref().map(peer_identity),
                });
            }

            SwarmEvent::Behaviour(ZetaBehaviourEvent::Gossip(gossipsub::Event::Subscribed {
                peer_id,
                topic,
            })) => {
                tracing::debug!(%peer_id, %topic, "peer subscribed");
            }

            SwarmEvent::Behaviour(ZetaBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                tracing::debug!(%peer_id, agent = %info.agent_version, "identify received");
            }

            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }
}
