//! Bounded FIFO cache of recently seen message digests.
//!
//! Gossip may deliver the same publication through several relays.
//! The [`SeenCache`] drops those copies before they are counted or
//! displayed. Entries are keyed by a SHA-256 digest of the author,
//! claimed timestamp, content and topic, which is stable across
//! relays (unlike the locally assigned record id).
//!
//! Implementation: `HashSet` for O(1) lookup + `VecDeque` for FIFO
//! eviction ordering.

use std::collections::{HashSet, VecDeque};

use sha2::{Digest, Sha256};
use zeta_types::MessageRecord;

/// A 32-byte message digest.
pub type MessageDigest = [u8; 32];

/// Computes the deduplication digest of a record.
pub fn digest(record: &MessageRecord) -> MessageDigest {
    let mut hasher = Sha256::new();
    for part in [
        record.author.as_deref().unwrap_or_default().as_bytes(),
        record.timestamp.to_rfc3339().as_bytes(),
        record.content.as_bytes(),
        record.topic.as_bytes(),
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Bounded FIFO set of recently seen digests.
pub struct SeenCache {
    seen: HashSet<MessageDigest>,
    order: VecDeque<MessageDigest>,
    capacity: usize,
}

impl SeenCache {
    /// Creates a cache holding at most `capacity` digests. A capacity
    /// of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            capacity: cap,
        }
    }

    /// Records `digest` and returns `true` if it was not already present.
    ///
    /// When the cache is full, the oldest digest is evicted first.
    pub fn insert(&mut self, digest: MessageDigest) -> bool {
        if self.seen.contains(&digest) {
            return false;
        }

        if self.seen.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(digest);
        self.order.push_back(digest);
        true
    }

    /// Returns the number of digests currently held.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use zeta_types::MessageSource;

    fn record(id: &str, content: &str, topic: &str) -> MessageRecord {
        let ts = Utc.timestamp_millis_opt(1_770_638_400_000).single().unwrap();
        MessageRecord {
            id: id.into(),
            kind: "user_message".into(),
            topic: topic.into(),
            author: Some("12D3KooWAuthor".into()),
            content: content.into(),
            timestamp: ts,
            received_at: ts,
            source: MessageSource::Unknown,
            version: None,
        }
    }

    #[test]
    fn digest_ignores_local_metadata() {
        let a = record("msg-1", "hi", "t");
        let mut b = record("msg-2", "hi", "t");
        b.source = MessageSource::Local;
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn digest_separates_topic_and_content() {
        assert_ne!(digest(&record("x", "hi", "a")), digest(&record("x", "hi", "b")));
        assert_ne!(digest(&record("x", "ab", "c")), digest(&record("x", "a", "bc")));
    }

    #[test]
    fn duplicate_rejected() {
        let mut cache = SeenCache::new(10);
        assert!(cache.insert([1; 32]));
        assert!(!cache.insert([1; 32]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_on_capacity() {
        let mut cache = SeenCache::new(2);
        assert!(cache.insert([1; 32]));
        assert!(cache.insert([2; 32]));
        assert!(cache.insert([3; 32]));
        assert_eq!(cache.len(), 2);
        // The oldest digest was evicted and is accepted again.
        assert!(cache.insert([1; 32]));
    }

    #[test]
    fn zero_capacity_treated_as_one() {
        let mut cache = SeenCache::new(0);
        assert!(cache.insert([1; 32]));
        assert!(cache.insert([2; 32]));
        assert_eq!(cache.len(), 1);
    }
}
