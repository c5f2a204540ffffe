//! Core storage engine: database lifecycle, schema check and tree access.
//!
//! The [`LocalStore`] owns the sled database. On
//! [`open`](LocalStore::open) it opens the database, creates all
//! required trees, and records or verifies the schema version.

use std::path::Path;

use zeta_types::{Result, ZetaError};

use crate::messages::MessageTable;
use crate::settings::SettingsStore;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Schema version written on first open.
pub const SCHEMA_VERSION: u32 = 1;

/// Key under which the schema version is stored in the `meta` tree.
const KEY_SCHEMA_VERSION: &[u8] = b"schema_version";

/// Trees created on open.
const TREES: [&str; 4] = ["messages", "messages_by_time", "settings", "meta"];

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

/// Durable message and settings storage backed by sled.
///
/// # Trees
///
/// - `messages`: record id to record
/// - `messages_by_time`: ordered timestamp index
/// - `settings`: key-value configuration
/// - `meta`: schema version
pub struct LocalStore {
    db: sled::Db,
    messages: MessageTable,
}

impl LocalStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::StorageFailure`] if the database cannot be
    /// opened, or if it was written with a different schema version.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| ZetaError::StorageFailure {
            reason: format!("failed to open sled database: {e}"),
        })?;

        for name in &TREES {
            open_tree(&db, name)?;
        }

        let messages = MessageTable::new(open_tree(&db, "messages")?, open_tree(&db, "messages_by_time")?);
        let store = Self { db, messages };
        store.check_schema()?;

        tracing::debug!(path = %path.display(), "local store opened");
        Ok(store)
    }

    /// Writes the schema version on a fresh database, or rejects a
    /// database written by an incompatible version.
    fn check_schema(&self) -> Result<()> {
        let meta = self.open_tree("meta")?;
        let current = meta
            .get(KEY_SCHEMA_VERSION)
            .map_err(|e| ZetaError::StorageFailure {
                reason: format!("failed to read schema version: {e}"),
            })?;

        match current {
            None => {
                meta.insert(KEY_SCHEMA_VERSION, SCHEMA_VERSION.to_be_bytes().to_vec())
                    .map_err(|e| ZetaError::StorageFailure {
                        reason: format!("failed to write schema version: {e}"),
                    })?;
                Ok(())
            }
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
                    ZetaError::StorageFailure {
                        reason: format!("schema version has invalid length {}", bytes.len()),
                    }
                })?;
                let found = u32::from_be_bytes(raw);
                if found != SCHEMA_VERSION {
                    return Err(ZetaError::StorageFailure {
                        reason: format!(
                            "unsupported schema version {found}, expected {SCHEMA_VERSION}"
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    /// Returns the stored schema version, if any.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let meta = self.open_tree("meta")?;
        let raw = meta
            .get(KEY_SCHEMA_VERSION)
            .map_err(|e| ZetaError::StorageFailure {
                reason: format!("failed to read schema version: {e}"),
            })?;
        Ok(raw.and_then(|b| <[u8; 4]>::try_from(b.as_ref()).ok().map(u32::from_be_bytes)))
    }

    /// Flushes all pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ZetaError::StorageFailure`] if the flush fails.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| ZetaError::StorageFailure {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }

    /// Opens a named sled tree.
    pub(crate) fn open_tree(&self, name: &str) -> Result<sled::Tree> {
        open_tree(&self.db, name)
    }

    /// The message table, built once on open.
    pub fn messages(&self) -> &MessageTable {
        &self.messages
    }

    /// Returns a [`SettingsStore`] for this store.
    pub fn settings(&self) -> Result<SettingsStore> {
        SettingsStore::new(self)
    }
}

fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree> {
    db.open_tree(name).map_err(|e| ZetaError::StorageFailure {
        reason: format!("failed to open tree '{name}': {e}"),
    })
}
