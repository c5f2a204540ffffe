//! Message table with a secondary time-ordered index.
//!
//! Records live in the `messages` tree keyed by their id. The
//! `messages_by_time` tree maps `order_key(timestamp) || id` to the id,
//! so a reverse iteration yields records newest claimed timestamp
//! first. Both trees are written in one sled transaction.

use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::Transactional;
use zeta_types::{MessageRecord, Result, ZetaError};

use crate::tree::{decode, encode, TypedTree};

// ---------------------------------------------------------------------------
// MessageTable
// ---------------------------------------------------------------------------

/// Durable message table keyed by [`MessageRecord::id`].
pub struct MessageTable {
    records: TypedTree<MessageRecord>,
    by_time: sled::Tree,
}

impl MessageTable {
    /// Wraps the record tree and its time index.
    pub(crate) fn new(records: sled::Tree, by_time: sled::Tree) -> Self {
        Self {
            records: TypedTree::new(records),
            by_time,
        }
    }

    /// Inserts or overwrites a record.
    ///
    /// Writing the same id twice leaves exactly one record and one index
    /// entry. The record and its index entry become visible together.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::StorageFailure`] if encoding or the
    /// transaction fails.
    pub fn put(&self, record: &MessageRecord) -> Result<()> {
        let id = record.id.as_bytes();
        let value = encode(record)?;
        let index_key = build_index_key(record.timestamp.timestamp_millis(), id);

        (self.records.raw(), &self.by_time)
            .transaction(|(records, by_time)| -> ConflictableTransactionResult<(), ()> {
                if let Some(old) = records.get(id)? {
                    let previous: MessageRecord =
                        decode(&old).map_err(|_| ConflictableTransactionError::Abort(()))?;
                    by_time.remove(build_index_key(previous.timestamp.timestamp_millis(), id))?;
                }
                records.insert(id, value.as_slice())?;
                by_time.insert(index_key.as_slice(), id)?;
                Ok(())
            })
            .map_err(|e| ZetaError::StorageFailure {
                reason: format!("message write transaction failed for '{}': {e:?}", record.id),
            })
    }

    /// Returns at most `limit` records in descending timestamp order.
    ///
    /// Index entries whose record is missing or undecodable are skipped.
    pub fn load_recent(&self, limit: usize) -> Result<Vec<MessageRecord>> {
        let mut out = Vec::with_capacity(limit.min(self.records.len()));

        for entry in self.by_time.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, id) = entry.map_err(|e| ZetaError::StorageFailure {
                reason: format!("time index scan failed: {e}"),
            })?;

            match self.records.get(&id) {
                Ok(Some(record)) => out.push(record),
                Ok(None) => {
                    tracing::debug!(id = %String::from_utf8_lossy(&id), "orphan time index entry");
                }
                Err(e) => {
                    tracing::warn!(id = %String::from_utf8_lossy(&id), %e, "skipping unreadable record");
                }
            }
        }

        Ok(out)
    }

    /// Retrieves a record by id.
    pub fn get(&self, id: &str) -> Result<Option<MessageRecord>> {
        self.records.get(id.as_bytes())
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Key construction
// ---------------------------------------------------------------------------

/// Maps signed milliseconds onto an unsigned value with the same order.
fn order_key(millis: i64) -> [u8; 8] {
    ((millis as u64) ^ (1 << 63)).to_be_bytes()
}

/// Builds an index key: `order_key(timestamp)(8) || id`.
fn build_index_key(timestamp_millis: i64, id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + id.len());
    key.extend_from_slice(&order_key(timestamp_millis));
    key.extend_from_slice(id);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_key_preserves_sign_order() {
        assert!(order_key(-5) < order_key(0));
        assert!(order_key(0) < order_key(1));
        assert!(order_key(1_700_000_000_000) < order_key(1_800_000_000_000));
    }

    #[test]
    fn index_key_layout() {
        let key = build_index_key(42, b"msg-1");
        assert_eq!(key.len(), 8 + 5);
        assert_eq!(&key[8..], b"msg-1");
    }
}
