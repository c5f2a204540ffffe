//! Inbound and outbound message flow.
//!
//! Inbound: decode → validate → enrich → dedup → prepend to buffer →
//! count → evict → persist (best effort) → notify observers.
//!
//! Outbound: frame a `user_message` envelope, publish it, then feed a
//! `local` echo straight into the display path.
//!
//! The in-memory buffer is newest-first and never exceeds
//! `message_limit`; eviction drops the oldest records. The local store
//! is never pruned.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use zeta_network::Transport;
use zeta_storage::MessageStore;
use zeta_types::config::SessionConfig;
use zeta_types::{MessageEnvelope, MessageRecord, MessageSource, PeerIdentity, Result, ZetaError};

use crate::dedup::{self, SeenCache};
use crate::observer::ObserverRegistry;
use crate::stats::SessionStats;

/// Length of the random suffix of a record id.
const ID_SUFFIX_LEN: usize = 9;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ---------------------------------------------------------------------------
// IngestOutcome
// ---------------------------------------------------------------------------

/// Result of feeding one inbound frame to the pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IngestOutcome {
    /// Accepted, buffered and displayed under the given record id.
    Accepted(String),
    /// Already seen through another relay; dropped.
    Duplicate,
    /// Failed decoding or validation; dropped.
    Malformed,
}

// ---------------------------------------------------------------------------
// MessagePipeline
// ---------------------------------------------------------------------------

/// Owns the message buffer and routes records to the store and the
/// display observers.
pub struct MessagePipeline {
    transport: Arc<dyn Transport>,
    store: Box<dyn MessageStore>,
    observers: ObserverRegistry,
    stats: Arc<SessionStats>,
    buffer: VecDeque<MessageRecord>,
    seen: SeenCache,
    default_topic: String,
    message_limit: usize,
    max_message_size: usize,
    max_timestamp_skew: Duration,
    replay_limit: usize,
}

impl MessagePipeline {
    /// Creates a pipeline publishing through `transport` and persisting
    /// into `store`.
    pub fn new(
        config: &SessionConfig,
        default_topic: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: Box<dyn MessageStore>,
        observers: ObserverRegistry,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            transport,
            store,
            observers,
            stats,
            buffer: VecDeque::with_capacity(config.message_limit.min(1024)),
            seen: SeenCache::new(config.dedup_cache_size),
            default_topic: default_topic.into(),
            message_limit: config.message_limit,
            max_message_size: config.max_message_size,
            max_timestamp_skew: config.max_timestamp_skew,
            replay_limit: config.replay_limit,
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Ingests one frame received on `topic`.
    ///
    /// Malformed and duplicate frames are logged and dropped; nothing
    /// is propagated to observers for them.
    pub fn ingest(&mut self, topic: &str, data: &[u8], source: Option<PeerIdentity>) -> IngestOutcome {
        let now = Utc::now();
        let envelope = match self.validate(data, now) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%topic, source = ?source, %e, "dropping inbound frame");
                return IngestOutcome::Malformed;
            }
        };

        let record = MessageRecord::from_envelope(
            generate_id("msg", now),
            topic,
            envelope,
            now,
            MessageSource::from(source),
        );

        if !self.seen.insert(dedup::digest(&record)) {
            tracing::debug!(%topic, "duplicate message dropped");
            return IngestOutcome::Duplicate;
        }

        let id = record.id.clone();
        self.push(record);
        self.stats.record_message();
        self.persist_and_notify();

        IngestOutcome::Accepted(id)
    }

    fn validate(&self, data: &[u8], now: DateTime<Utc>) -> Result<MessageEnvelope> {
        if data.len() > self.max_message_size {
            return Err(ZetaError::MalformedMessage {
                reason: format!("frame of {} bytes exceeds {} bytes", data.len(), self.max_message_size),
            });
        }

        let envelope = MessageEnvelope::decode(data)?;

        let skew = (now - envelope.timestamp).abs().to_std().unwrap_or(Duration::MAX);
        if skew > self.max_timestamp_skew {
            return Err(ZetaError::MalformedMessage {
                reason: format!("timestamp {} is {}s away from local time", envelope.timestamp, skew.as_secs()),
            });
        }

        Ok(envelope)
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Publishes `content` on `topic` (default topic when `None`) and
    /// displays a local echo on success.
    ///
    /// A success only means the transport accepted the frame; gossip
    /// delivery is not acknowledged.
    ///
    /// # Errors
    ///
    /// - [`ZetaError::MalformedMessage`] for empty content.
    /// - [`ZetaError::PublishUnavailable`] if no pub/sub capability is
    ///   available.
    /// - [`ZetaError::NetworkError`] for other publish failures.
    pub async fn send_message(&mut self, content: &str, topic: Option<&str>) -> Result<MessageRecord> {
        if content.trim().is_empty() {
            return Err(ZetaError::MalformedMessage {
                reason: "message content is empty".into(),
            });
        }

        let topic = topic.unwrap_or(self.default_topic.as_str()).to_string();
        let author = self.transport.local_peer_id();
        let now = Utc::now();
        let envelope = MessageEnvelope::user_message(content, &author, now);

        self.transport.publish(&topic, envelope.encode()?).await?;
        tracing::info!(%topic, "message published");

        let record = MessageRecord::from_envelope(
            generate_id("local", now),
            &topic,
            envelope,
            now,
            MessageSource::Local,
        );

        // A self-delivering transport must not produce a second copy.
        self.seen.insert(dedup::digest(&record));
        self.push(record.clone());
        self.persist_and_notify();

        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Buffer and history
    // -----------------------------------------------------------------------

    fn push(&mut self, record: MessageRecord) {
        self.buffer.push_front(record);
        self.buffer.truncate(self.message_limit);
    }

    /// Stores and displays the record at the head of the buffer.
    fn persist_and_notify(&self) {
        if let Some(record) = self.buffer.front() {
            if let Err(e) = self.store.put(record) {
                tracing::warn!(id = %record.id, %e, "failed to persist message");
            }
            self.observers.message(record);
        }
    }

    /// Buffered records, newest first.
    pub fn buffer(&self) -> &VecDeque<MessageRecord> {
        &self.buffer
    }

    /// Replays up to `replay_limit` stored records to observers, oldest
    /// first. Replayed records are neither buffered nor counted.
    ///
    /// Returns the number of records replayed.
    pub fn replay_history(&self) -> usize {
        let mut records = match self.store.load_recent(self.replay_limit) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(%e, "history replay unavailable");
                return 0;
            }
        };
        records.reverse();
        for record in &records {
            self.observers.message(record);
        }
        tracing::info!(count = records.len(), "history replayed");
        records.len()
    }

    /// Flushes the store.
    pub fn flush(&self) {
        if let Err(e) = self.store.flush() {
            tracing::warn!(%e, "failed to flush local store");
        }
    }
}

/// Builds `{prefix}-{millis}-{9 base36 chars}`.
fn generate_id(prefix: &str, at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", at.timestamp_millis())
}
