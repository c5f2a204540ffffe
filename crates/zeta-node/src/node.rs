//! Node lifecycle and state machine.
//!
//! The [`Node`] is the public entry point for the Zeta runtime. It
//! owns the session manager and the message pipeline and exposes a
//! channel-based API for the daemon and tests.
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ (dropped)
//! ```
//!
//! Double-start and shutdown-from-initializing are rejected with
//! `ZetaError::ConfigError`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use zeta_network::{RelayDirectory, SessionRegistrar, Transport, TransportEvent};
use zeta_storage::MessageStore;
use zeta_types::config::SessionConfig;
use zeta_types::{PeerIdentity, ZetaError};

use crate::command::NodeCommand;
use crate::event_loop;
use crate::observer::ObserverRegistry;
use crate::pipeline::MessagePipeline;
use crate::session::SessionManager;
use crate::stats::SessionStats;

/// Convenience alias.
type BResult<T> = std::result::Result<T, ZetaError>;

/// Bounded command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Components created, event loop not started.
    Initializing,
    /// Event loop is active.
    Running,
    /// Graceful shutdown in progress.
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeParts
// ---------------------------------------------------------------------------

/// External collaborators wired into a [`Node`].
///
/// The daemon fills this with the libp2p transport, the HTTP directory
/// client and the sled store; tests substitute fakes.
pub struct NodeParts {
    /// Publish/subscribe transport.
    pub transport: Arc<dyn Transport>,
    /// Event stream produced by `transport`.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Relay directory client.
    pub directory: Arc<dyn RelayDirectory>,
    /// Session registration endpoint.
    pub registrar: Arc<dyn SessionRegistrar>,
    /// Local message history.
    pub store: Box<dyn MessageStore>,
    /// Status, relay and message subscribers.
    pub observers: ObserverRegistry,
}

// ---------------------------------------------------------------------------
// NodeRuntime (internal)
// ---------------------------------------------------------------------------

/// Owned runtime state moved into the event loop task.
pub(crate) struct NodeRuntime {
    pub session: SessionManager,
    pub pipeline: MessagePipeline,
    pub stats: Arc<SessionStats>,
    pub transport: Arc<dyn Transport>,
    pub config: SessionConfig,
    pub command_rx: mpsc::Receiver<NodeCommand>,
    pub shutdown_rx: watch::Receiver<bool>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Zeta node. Owns all subsystems and drives the event loop.
///
/// After construction via [`Node::new`], call [`Node::start`] to
/// spawn the event loop. Send [`NodeCommand`]s via
/// [`Node::command_sender`]; shut down via [`NodeCommand::Shutdown`]
/// or [`Node::shutdown`].
pub struct Node {
    state: NodeState,
    /// `None` after `start()` has been called.
    runtime: Option<NodeRuntime>,
    command_tx: mpsc::Sender<NodeCommand>,
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<SessionStats>,
    local_peer_id: PeerIdentity,
}

impl Node {
    /// Creates a node subscribing to `topics`. The first topic is the
    /// default publish target.
    ///
    /// # Errors
    ///
    /// - `ZetaError::ConfigError` if `config` is invalid or `topics`
    ///   is empty.
    pub fn new(config: SessionConfig, topics: Vec<String>, parts: NodeParts) -> BResult<Self> {
        config.validate()?;

        let default_topic = topics.first().cloned().ok_or_else(|| ZetaError::ConfigError {
            reason: "at least one topic is required".into(),
        })?;

        let stats = Arc::new(SessionStats::new());
        let local_peer_id = parts.transport.local_peer_id();

        let session = SessionManager::new(
            config.clone(),
            topics,
            Arc::clone(&parts.transport),
            parts.events,
            parts.directory,
            parts.registrar,
            parts.observers.clone(),
            Arc::clone(&stats),
        );
        let pipeline = MessagePipeline::new(
            &config,
            default_topic,
            Arc::clone(&parts.transport),
            parts.store,
            parts.observers,
            Arc::clone(&stats),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = NodeRuntime {
            session,
            pipeline,
            stats: Arc::clone(&stats),
            transport: parts.transport,
            config,
            command_rx,
            shutdown_rx,
        };

        Ok(Self {
            state: NodeState::Initializing,
            runtime: Some(runtime),
            command_tx,
            shutdown_tx,
            stats,
            local_peer_id,
        })
    }

    /// Starts the event loop in a new tokio task.
    ///
    /// Transitions `Initializing → Running`. The returned handle
    /// resolves once the event loop has exited and the transport has
    /// been shut down.
    ///
    /// # Errors
    ///
    /// - `ZetaError::ConfigError` if the node is not in `Initializing`
    ///   state.
    pub fn start(&mut self) -> BResult<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(ZetaError::ConfigError {
                reason: format!(
                    "cannot start node in state '{}'; expected 'initializing'",
                    self.state,
                ),
            });
        }

        let runtime = self.runtime.take().ok_or_else(|| ZetaError::ConfigError {
            reason: "runtime already consumed (double start?)".into(),
        })?;

        let handle = tokio::spawn(async move {
            event_loop::run_event_loop(runtime).await;
        });

        self.state = NodeState::Running;
        Ok(handle)
    }

    /// Signals the event loop to exit.
    ///
    /// Await the `JoinHandle` returned by [`start`](Self::start) to
    /// wait for completion. Calling this twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `ZetaError::ConfigError` if the node has not been started.
    pub fn shutdown(&mut self) -> BResult<()> {
        match self.state {
            NodeState::Initializing => Err(ZetaError::ConfigError {
                reason: "cannot shutdown a node that has not been started".into(),
            }),
            NodeState::ShuttingDown => Ok(()),
            NodeState::Running => {
                self.state = NodeState::ShuttingDown;
                let _ = self.shutdown_tx.send(true);
                Ok(())
            }
        }
    }

    /// Returns a cloneable sender for submitting commands.
    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// Shared stats tracker.
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Identity of this node on the transport.
    pub fn local_peer_id(&self) -> &PeerIdentity {
        &self.local_peer_id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }
}
