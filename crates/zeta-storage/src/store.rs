//! The persistence seam used by the message pipeline.

use zeta_types::{MessageRecord, Result};

use crate::engine::LocalStore;

/// Durable message persistence as seen by the pipeline.
///
/// Implementations must make `put` atomic per record: a concurrent
/// reader never observes a record without its index entry or a
/// partially written value.
pub trait MessageStore: Send {
    /// Idempotent upsert keyed by `record.id`.
    fn put(&self, record: &MessageRecord) -> Result<()>;

    /// Returns at most `limit` records, newest claimed timestamp first.
    fn load_recent(&self, limit: usize) -> Result<Vec<MessageRecord>>;

    /// Flushes buffered writes to durable media.
    fn flush(&self) -> Result<()>;
}

impl MessageStore for LocalStore {
    fn put(&self, record: &MessageRecord) -> Result<()> {
        self.messages().put(record)
    }

    fn load_recent(&self, limit: usize) -> Result<Vec<MessageRecord>> {
        self.messages().load_recent(limit)
    }

    fn flush(&self) -> Result<()> {
        LocalStore::flush(self)
    }
}

/// Store used when the database is unavailable: accepts every write,
/// remembers nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStore;

impl MessageStore for NullStore {
    fn put(&self, _record: &MessageRecord) -> Result<()> {
        Ok(())
    }

    fn load_recent(&self, _limit: usize) -> Result<Vec<MessageRecord>> {
        Ok(Vec::new())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
