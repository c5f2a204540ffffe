//! Core shared types for the Zeta Network session manager.
//!
//! This crate defines the data model shared by the storage, network
//! and node crates: peer identities, relay descriptors, message
//! records, the wire envelope, and the workspace-wide error enum.

pub mod config;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Envelope `type` for messages typed by a user.
pub const USER_MESSAGE_TYPE: &str = "user_message";

/// Envelope format version stamped on every outbound message.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Author shown for envelopes that did not claim one.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

// ---------------------------------------------------------------------------
// PeerIdentity
// ---------------------------------------------------------------------------

/// Opaque, stable identifier of a node for the lifetime of a process.
///
/// Holds the textual form of the transport's peer id (base58 multihash
/// for libp2p). Used for the local node, for relays in the active set,
/// and as the source of received messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Wraps a peer id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the peer id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns at most `len` leading characters, for compact display.
    pub fn short(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// RelayDescriptor
// ---------------------------------------------------------------------------

/// Availability reported by the relay directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    /// The relay accepts connections.
    Online,
    /// The relay is down or its status is unknown.
    Offline,
}

impl RelayStatus {
    /// Maps a directory status string. Anything but `online` is offline.
    pub fn from_directory(s: &str) -> Self {
        if s.eq_ignore_ascii_case("online") {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A candidate relay endpoint as published by the relay directory.
///
/// Read-only once fetched; a fresh fetch produces a new set.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RelayDescriptor {
    /// Directory-assigned relay identifier (e.g. `relay-01`).
    pub id: String,
    /// Dialable address (multiaddr).
    pub address: String,
    /// Human-readable name, if the directory provides one.
    pub display_name: Option<String>,
    /// Latency observed by the directory, in milliseconds.
    pub observed_latency_ms: u64,
    /// Reported availability.
    pub status: RelayStatus,
}

impl RelayDescriptor {
    /// Returns the display name, falling back to the relay id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// MessageSource
// ---------------------------------------------------------------------------

/// Where a [`MessageRecord`] came from.
///
/// Serialized as a plain string: `"local"`, `"unknown"`, or the
/// propagating peer's id.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MessageSource {
    /// Submitted on this node and echoed locally.
    Local,
    /// Received from the given propagating peer.
    Peer(PeerIdentity),
    /// Received without a known propagating peer.
    Unknown,
}

impl MessageSource {
    /// Returns `true` for local echoes.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl From<Option<PeerIdentity>> for MessageSource {
    fn from(peer: Option<PeerIdentity>) -> Self {
        match peer {
            Some(p) => Self::Peer(p),
            None => Self::Unknown,
        }
    }
}

impl From<String> for MessageSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "local" => Self::Local,
            "unknown" => Self::Unknown,
            _ => Self::Peer(PeerIdentity::new(s)),
        }
    }
}

impl From<MessageSource> for String {
    fn from(source: MessageSource) -> Self {
        source.to_string()
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Peer(p) => f.write_str(p.as_str()),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageEnvelope
// ---------------------------------------------------------------------------

/// JSON payload carried by a gossip frame.
///
/// ```json
/// {"type":"user_message","content":"hi","author":"12D3KooW...",
///  "timestamp":"2026-02-09T12:00:00Z","version":"1.0"}
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Message kind, `user_message` for typed messages.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub content: String,
    /// Author-claimed identity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Author-claimed submission time.
    pub timestamp: DateTime<Utc>,
    /// Envelope format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MessageEnvelope {
    /// Builds a `user_message` envelope stamped with `timestamp`.
    pub fn user_message(content: impl Into<String>, author: &PeerIdentity, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: USER_MESSAGE_TYPE.to_string(),
            content: content.into(),
            author: Some(author.to_string()),
            timestamp,
            version: Some(ENVELOPE_VERSION.to_string()),
        }
    }

    /// Encodes the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::MalformedMessage`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ZetaError::MalformedMessage {
            reason: format!("failed to encode envelope: {e}"),
        })
    }

    /// Decodes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::MalformedMessage`] if the bytes are not a
    /// JSON object with `type`, `content` and an RFC 3339 `timestamp`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ZetaError::MalformedMessage {
            reason: format!("failed to decode envelope: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// MessageRecord
// ---------------------------------------------------------------------------

/// An ingested or locally submitted message, enriched with local
/// metadata. Immutable once created.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Locally unique record id (`msg-…` or `local-…`).
    pub id: String,
    /// Envelope kind.
    pub kind: String,
    /// Topic the message was published on.
    pub topic: String,
    /// Author-claimed identity, if any.
    pub author: Option<String>,
    /// Message body.
    pub content: String,
    /// Author-claimed submission time.
    pub timestamp: DateTime<Utc>,
    /// Local wall-clock time of ingestion.
    pub received_at: DateTime<Utc>,
    /// Origin of the record.
    pub source: MessageSource,
    /// Envelope version, if the author stamped one.
    pub version: Option<String>,
}

impl MessageRecord {
    /// Enriches a decoded envelope into a record.
    pub fn from_envelope(
        id: String,
        topic: &str,
        envelope: MessageEnvelope,
        received_at: DateTime<Utc>,
        source: MessageSource,
    ) -> Self {
        Self {
            id,
            kind: envelope.kind,
            topic: topic.to_string(),
            author: envelope.author,
            content: envelope.content,
            timestamp: envelope.timestamp,
            received_at,
            source,
            version: envelope.version,
        }
    }

    /// Returns the author for display, `Anonymous` when absent.
    pub fn display_author(&self) -> &str {
        self.author.as_deref().unwrap_or(ANONYMOUS_AUTHOR)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Coarse connectivity status surfaced to display observers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// At least one relay is connected and topics are subscribed.
    Ready,
    /// A connection batch is in progress.
    Connecting,
    /// Discovery or every connection attempt failed; a retry is pending.
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Connecting => write!(f, "connecting"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// ZetaError
// ---------------------------------------------------------------------------

/// Central error type for the Zeta Network session manager.
///
/// Network-path variants (`DirectoryUnavailable`, `NoRelaysReachable`)
/// drive timed retries; content-path variants (`MalformedMessage`,
/// `StorageFailure`) are absorbed and logged by the pipeline.
#[derive(Debug, Error)]
pub enum ZetaError {
    /// Relay discovery failed: the directory could not be reached or
    /// returned malformed data.
    #[error("relay directory unavailable: {reason}")]
    DirectoryUnavailable {
        /// Human-readable description of the discovery failure.
        reason: String,
    },

    /// Every connection attempt in a batch failed.
    #[error("no relays reachable: {reason}")]
    NoRelaysReachable {
        /// Human-readable description, usually the attempt count.
        reason: String,
    },

    /// An inbound frame could not be decoded or failed validation.
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// Human-readable description of the decoding failure.
        reason: String,
    },

    /// No pub/sub capability is currently available for publishing.
    #[error("publish unavailable: {reason}")]
    PublishUnavailable {
        /// Human-readable description of why publishing is not possible.
        reason: String,
    },

    /// A persistence read or write failed.
    #[error("storage failure: {reason}")]
    StorageFailure {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A transport operation failed (construction, dial, subscribe).
    #[error("network error: {reason}")]
    NetworkError {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// A configuration value is invalid, or a lifecycle call was made
    /// in the wrong state.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// A stored or supplied identity keypair could not be decoded.
    #[error("identity error: {reason}")]
    IdentityError {
        /// Human-readable description of the identity problem.
        reason: String,
    },
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, ZetaError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    #[test]
    fn envelope_decodes_browser_payload() {
        let raw = br#"{"type":"user_message","content":"salut","author":"user-1",
            "timestamp":"2026-02-09T12:00:00.000Z","version":"1.0"}"#;
        let env = MessageEnvelope::decode(raw).unwrap();
        assert_eq!(env.kind, USER_MESSAGE_TYPE);
        assert_eq!(env.content, "salut");
        assert_eq!(env.author.as_deref(), Some("user-1"));
        assert_eq!(env.timestamp, ts());
    }

    #[test]
    fn envelope_without_author_or_version_decodes() {
        let raw = br#"{"type":"announcement","content":"maintenance","timestamp":"2026-02-09T12:00:00Z"}"#;
        let env = MessageEnvelope::decode(raw).unwrap();
        assert!(env.author.is_none());
        assert!(env.version.is_none());
    }

    #[test]
    fn envelope_missing_content_is_malformed() {
        let raw = br#"{"type":"user_message","timestamp":"2026-02-09T12:00:00Z"}"#;
        let err = MessageEnvelope::decode(raw).unwrap_err();
        assert!(matches!(err, ZetaError::MalformedMessage { .. }));
    }

    #[test]
    fn envelope_garbage_is_malformed() {
        let err = MessageEnvelope::decode(b"\xff\x00not json").unwrap_err();
        assert!(matches!(err, ZetaError::MalformedMessage { .. }));
    }

    #[test]
    fn user_message_envelope_is_stamped() {
        let me = PeerIdentity::new("12D3KooWLocal");
        let env = MessageEnvelope::user_message("hello", &me, ts());
        assert_eq!(env.kind, "user_message");
        assert_eq!(env.author.as_deref(), Some("12D3KooWLocal"));
        assert_eq!(env.version.as_deref(), Some(ENVELOPE_VERSION));

        let json: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "user_message");
    }

    #[test]
    fn message_source_string_form() {
        assert_eq!(MessageSource::Local.to_string(), "local");
        assert_eq!(MessageSource::Unknown.to_string(), "unknown");
        assert_eq!(MessageSource::from("12D3KooWPeer".to_string()), MessageSource::Peer("12D3KooWPeer".into()));
        assert_eq!(MessageSource::from(None), MessageSource::Unknown);
    }

    #[test]
    fn session_status_labels() {
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
        assert_eq!(SessionStatus::Connecting.to_string(), "connecting");
        assert_eq!(SessionStatus::Error.to_string(), "error");
    }

    #[test]
    fn record_serializes_source_as_string() {
        let env = MessageEnvelope::user_message("x", &PeerIdentity::new("me"), ts());
        let rec = MessageRecord::from_envelope("local-1".into(), "t", env, ts(), MessageSource::Local);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["source"], "local");
    }

    #[test]
    fn display_author_falls_back_to_anonymous() {
        let raw = br#"{"type":"user_message","content":"x","timestamp":"2026-02-09T12:00:00Z"}"#;
        let env = MessageEnvelope::decode(raw).unwrap();
        let rec = MessageRecord::from_envelope("msg-1".into(), "t", env, ts(), MessageSource::Unknown);
        assert_eq!(rec.display_author(), ANONYMOUS_AUTHOR);
    }

    #[test]
    fn relay_status_from_directory_string() {
        assert_eq!(RelayStatus::from_directory("online"), RelayStatus::Online);
        assert_eq!(RelayStatus::from_directory("ONLINE"), RelayStatus::Online);
        assert_eq!(RelayStatus::from_directory("maintenance"), RelayStatus::Offline);
    }

    #[test]
    fn peer_identity_short_is_char_safe() {
        let p = PeerIdentity::new("12D3KooWabcdef");
        assert_eq!(p.short(8), "12D3KooW");
        assert_eq!(p.short(100), "12D3KooWabcdef");
    }
}
