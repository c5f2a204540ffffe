//! Network layer for the Zeta Network session manager.
//!
//! Wraps the libp2p gossipsub stack behind the [`transport::Transport`]
//! trait and provides the HTTP relay directory client.

pub mod config;
pub mod directory;
pub mod events;
pub mod gossip;
pub mod identity;
pub mod swarm;
pub mod transport;

pub use directory::{HttpDirectory, HttpRegistrar, RelayDirectory, SessionRegistrar};
pub use events::TransportEvent;
pub use swarm::GossipTransport;
pub use transport::Transport;
