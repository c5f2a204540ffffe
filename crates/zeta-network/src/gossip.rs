//! Gossipsub and identify construction for the Zeta Network.
//!
//! Two well-known topics are subscribed by default:
//!
//! - `zeta-network-global`: user chat broadcast.
//! - `zeta-system-announcements`: operator announcements.
//!
//! The behaviour never delivers a node's own publications back to it
//! (`emit_self` is not enabled for gossipsub).

use libp2p::{gossipsub, identify, identity};

use zeta_types::{Result, ZetaError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Global broadcast topic.
pub const TOPIC_GLOBAL: &str = "zeta-network-global";

/// System announcements topic.
pub const TOPIC_SYSTEM_ANNOUNCEMENTS: &str = "zeta-system-announcements";

/// Protocol version advertised through identify.
pub const IDENTIFY_PROTOCOL: &str = "/zeta/1.0.0";

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds a signed `gossipsub::Behaviour` accepting frames up to
/// `max_transmit_size` bytes.
///
/// # Errors
///
/// Returns `ZetaError::NetworkError` if the gossipsub config is
/// invalid.
pub fn build_gossip_behaviour(
    keypair: &identity::Keypair,
    max_transmit_size: usize,
) -> Result<gossipsub::Behaviour> {
    let config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(max_transmit_size)
        .build()
        .map_err(|e| ZetaError::NetworkError {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(keypair.clone()), config)
        .map_err(|e| ZetaError::NetworkError {
            reason: format!("failed to create gossipsub behaviour: {e}"),
        })
}

/// Builds the identify behaviour so relays learn our listen addresses.
pub fn build_identify_behaviour(keypair: &identity::Keypair) -> identify::Behaviour {
    identify::Behaviour::new(identify::Config::new(
        IDENTIFY_PROTOCOL.to_string(),
        keypair.public(),
    ))
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

/// Creates a gossipsub [`IdentTopic`](gossipsub::IdentTopic) from a topic string.
pub fn topic(name: &str) -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new(name)
}

/// Subscribes the behaviour to `name`.
///
/// # Errors
///
/// Returns `ZetaError::NetworkError` if subscription fails.
pub fn subscribe(behaviour: &mut gossipsub::Behaviour, name: &str) -> Result<()> {
    behaviour
        .subscribe(&topic(name))
        .map_err(|e| ZetaError::NetworkError {
            reason: format!("failed to subscribe to topic '{name}': {e}"),
        })?;
    Ok(())
}

/// Publishes `data` on `name`.
///
/// # Errors
///
/// - [`ZetaError::PublishUnavailable`] if no connected peer carries
///   the topic.
/// - [`ZetaError::NetworkError`] for every other publish failure.
pub fn publish(behaviour: &mut gossipsub::Behaviour, name: &str, data: Vec<u8>) -> Result<()> {
    match behaviour.publish(topic(name), data) {
        Ok(_) => Ok(()),
        Err(gossipsub::PublishError::InsufficientPeers) => Err(ZetaError::PublishUnavailable {
            reason: format!("no connected peer carries topic '{name}'"),
        }),
        Err(e) => Err(ZetaError::NetworkError {
            reason: format!("failed to publish to topic '{name}': {e}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
