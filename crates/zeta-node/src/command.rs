//! Commands and status types for external → node communication.
//!
//! [`NodeCommand`] is the bounded-channel message type that the daemon
//! and tests use to drive the node. Each command that produces a result
//! carries a `tokio::sync::oneshot::Sender` for the reply.
//!
//! All commands are processed sequentially inside the event loop, so
//! they never race with transport events or timers.

use tokio::sync::oneshot;

use zeta_types::{MessageRecord, PeerIdentity, SessionStatus, ZetaError};

use crate::node::NodeState;
use crate::session::SessionState;
use crate::stats::StatsSnapshot;

/// Convenience alias to avoid shadowing `std::result::Result`.
type BResult<T> = std::result::Result<T, ZetaError>;

// ---------------------------------------------------------------------------
// NodeCommand
// ---------------------------------------------------------------------------

/// Commands accepted by the node event loop.
pub enum NodeCommand {
    /// Publish a user message and echo it locally.
    SendMessage {
        /// Message body.
        content: String,
        /// Target topic; the default topic when `None`.
        topic: Option<String>,
        /// Reply channel. Returns the local echo record on success.
        reply: oneshot::Sender<BResult<MessageRecord>>,
    },

    /// Query the current node status.
    GetStatus {
        /// Reply channel for the status snapshot.
        reply: oneshot::Sender<NodeStatus>,
    },

    /// Re-run relay discovery and connection now, cancelling any
    /// scheduled retry.
    Reconnect {
        /// Reply channel. Returns the number of relays connected by
        /// the new batch.
        reply: oneshot::Sender<BResult<usize>>,
    },

    /// Initiate graceful shutdown.
    ///
    /// No reply channel; await the `JoinHandle` returned by
    /// [`Node::start`](crate::node::Node::start) to confirm completion.
    Shutdown,
}

// Manual Debug because the reply senders carry no useful detail.
impl std::fmt::Debug for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendMessage { topic, content, .. } => f
                .debug_struct("SendMessage")
                .field("topic", topic)
                .field("len", &content.len())
                .finish_non_exhaustive(),
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::Reconnect { .. } => f.write_str("Reconnect"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Snapshot of the node's current state.
///
/// Returned by [`NodeCommand::GetStatus`]. All fields are cloned from
/// the runtime so the reply is self-contained.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    /// Node lifecycle state.
    pub state: NodeState,
    /// Session state machine state.
    pub session: SessionState,
    /// Coarse status as shown to observers.
    pub status: SessionStatus,
    /// Identity of this node.
    pub peer_id: PeerIdentity,
    /// Currently connected relays.
    pub active_relays: Vec<PeerIdentity>,
    /// Subscribed topics.
    pub topics: Vec<String>,
    /// Counters and uptime.
    pub stats: StatsSnapshot,
    /// Records held in the in-memory buffer.
    pub buffered_messages: usize,
}
