//! Events emitted by a [`Transport`](crate::transport::Transport).
//!
//! All libp2p-specific events are mapped into [`TransportEvent`] before
//! being delivered to the session layer, so the node crate never
//! touches libp2p types.

use zeta_types::PeerIdentity;

/// Events emitted by the transport adapter.
///
/// Per topic, `MessageReceived` events arrive in the order the
/// transport observed the messages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    /// The first connection to a peer was established.
    PeerConnected(PeerIdentity),

    /// The last connection to a peer was closed.
    PeerDisconnected(PeerIdentity),

    /// A gossip message was received on a subscribed topic.
    MessageReceived {
        /// Topic string the message was published on.
        topic: String,
        /// Raw payload bytes.
        data: Vec<u8>,
        /// Originating peer, when the message carried one.
        source: Option<PeerIdentity>,
    },
}
