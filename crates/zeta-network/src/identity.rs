//! Node identity: ephemeral generation or persisted keypair.
//!
//! A persisted keypair is stored hex-encoded (libp2p protobuf
//! encoding) in the settings table under [`KEY_IDENTITY_KEYPAIR`].

use libp2p::identity;
use libp2p::PeerId;

use zeta_storage::settings::SettingsStore;
use zeta_types::config::IdentityMode;
use zeta_types::{PeerIdentity, Result, ZetaError};

/// Settings key holding the persisted keypair.
pub const KEY_IDENTITY_KEYPAIR: &str = "identity_keypair";

/// Generates a fresh Ed25519 identity.
pub fn generate() -> identity::Keypair {
    identity::Keypair::generate_ed25519()
}

/// Returns the stored keypair, generating and storing one on first use.
///
/// # Errors
///
/// - [`ZetaError::IdentityError`] if the stored value cannot be decoded.
/// - [`ZetaError::StorageFailure`] if the settings table fails.
pub fn load_or_generate(settings: &SettingsStore) -> Result<identity::Keypair> {
    if let Some(stored) = settings.get(KEY_IDENTITY_KEYPAIR)? {
        let bytes = hex::decode(stored.trim()).map_err(|e| ZetaError::IdentityError {
            reason: format!("stored keypair is not valid hex: {e}"),
        })?;
        let keypair = identity::Keypair::from_protobuf_encoding(&bytes).map_err(|e| {
            ZetaError::IdentityError {
                reason: format!("stored keypair cannot be decoded: {e}"),
            }
        })?;
        tracing::info!(peer_id = %PeerId::from(keypair.public()), "loaded persisted identity");
        return Ok(keypair);
    }

    let keypair = generate();
    let encoded = keypair
        .to_protobuf_encoding()
        .map_err(|e| ZetaError::IdentityError {
            reason: format!("failed to encode keypair: {e}"),
        })?;
    settings.set(KEY_IDENTITY_KEYPAIR, &hex::encode(encoded))?;
    tracing::info!(peer_id = %PeerId::from(keypair.public()), "generated and persisted identity");
    Ok(keypair)
}

/// Resolves the identity for `mode`.
///
/// `Persistent` without a settings table falls back to an ephemeral
/// identity.
pub fn resolve(mode: IdentityMode, settings: Option<&SettingsStore>) -> Result<identity::Keypair> {
    match (mode, settings) {
        (IdentityMode::Persistent, Some(settings)) => load_or_generate(settings),
        (IdentityMode::Persistent, None) => {
            tracing::warn!("persistent identity requested without a store; using ephemeral identity");
            Ok(generate())
        }
        (IdentityMode::Ephemeral, _) => Ok(generate()),
    }
}

/// Maps a libp2p peer id to the session-level identity.
pub fn peer_identity(peer_id: &PeerId) -> PeerIdentity {
    PeerIdentity::new(peer_id.to_string())
}

/// Parses a session-level identity back into a libp2p peer id.
///
/// # Errors
///
/// Returns [`ZetaError::IdentityError`] if the string is not a peer id.
pub fn parse_peer_id(peer: &PeerIdentity) -> Result<PeerId> {
    peer.as_str().parse().map_err(|e| ZetaError::IdentityError {
        reason: format!("invalid peer id '{peer}': {e}"),
    })
}
