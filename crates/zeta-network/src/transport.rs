//! The transport seam between the session layer and the pub/sub peer
//! runtime.
//!
//! Implementations perform no retry or backoff; that belongs to the
//! session manager. Events are delivered on the receiver returned when
//! the transport is constructed.

use async_trait::async_trait;
use zeta_types::{PeerIdentity, Result};

/// Capability set of a pub/sub peer runtime.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dials `address` and resolves once a connection is established,
    /// returning the remote peer's identity.
    ///
    /// Succeeds immediately when the address names an already
    /// connected peer.
    async fn connect(&self, address: &str) -> Result<PeerIdentity>;

    /// Closes every connection to `peer`.
    async fn disconnect(&self, peer: &PeerIdentity) -> Result<()>;

    /// Subscribes to `topic`. Subscribing twice is not an error.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publishes `data` on `topic`.
    ///
    /// Returns [`ZetaError::PublishUnavailable`](zeta_types::ZetaError::PublishUnavailable)
    /// when no peer currently carries the topic. Success does not imply
    /// delivery.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;

    /// Identity of this node.
    fn local_peer_id(&self) -> PeerIdentity;

    /// Stops the underlying runtime. Later calls fail.
    async fn shutdown(&self) {}
}
