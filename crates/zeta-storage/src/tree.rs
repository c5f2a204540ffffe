//! Generic bincode-typed sled tree wrapper.
//!
//! [`TypedTree<T>`] serializes values with bincode on write and
//! deserializes on read, mapping every sled and codec failure into
//! [`ZetaError::StorageFailure`].

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use zeta_types::{Result, ZetaError};

/// A sled tree whose values are bincode-encoded `T`.
pub struct TypedTree<T> {
    tree: sled::Tree,
    _marker: PhantomData<T>,
}

impl<T> TypedTree<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wraps an opened sled tree.
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self {
            tree,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying sled tree (crate-internal, for
    /// multi-tree transactions).
    pub(crate) fn raw(&self) -> &sled::Tree {
        &self.tree
    }

    /// Retrieves and decodes a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<T>> {
        let raw = self.tree.get(key).map_err(|e| ZetaError::StorageFailure {
            reason: format!("sled get failed: {e}"),
        })?;

        match raw {
            None => Ok(None),
            Some(bytes) => decode(&bytes).map(Some),
        }
    }

    /// Encodes and inserts a value, overwriting any previous one.
    pub fn insert(&self, key: &[u8], value: &T) -> Result<()> {
        let bytes = encode(value)?;
        self.tree
            .insert(key, bytes)
            .map_err(|e| ZetaError::StorageFailure {
                reason: format!("sled insert failed: {e}"),
            })?;
        Ok(())
    }

    /// Removes a key. Returns `Ok(true)` if it existed.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let prev = self.tree.remove(key).map_err(|e| ZetaError::StorageFailure {
            reason: format!("sled remove failed: {e}"),
        })?;
        Ok(prev.is_some())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Encodes a value with bincode.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ZetaError::StorageFailure {
        reason: format!("bincode serialization failed: {e}"),
    })
}

/// Decodes a bincode value.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| ZetaError::StorageFailure {
        reason: format!("bincode deserialization failed: {e}"),
    })
}
