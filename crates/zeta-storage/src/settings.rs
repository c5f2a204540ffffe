//! Key-value settings store.
//!
//! Holds small string settings such as the persisted identity keypair.

use serde::{Deserialize, Serialize};
use zeta_types::Result;

use crate::engine::LocalStore;
use crate::tree::TypedTree;

/// Wrapper for a stored setting value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingValue {
    /// The setting value as a string.
    pub value: String,
}

/// Key-value settings table.
pub struct SettingsStore {
    tree: TypedTree<SettingValue>,
}

impl SettingsStore {
    pub(crate) fn new(store: &LocalStore) -> Result<Self> {
        Ok(Self {
            tree: TypedTree::new(store.open_tree("settings")?),
        })
    }

    /// Sets a string setting.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(
            key.as_bytes(),
            &SettingValue {
                value: value.to_string(),
            },
        )
    }

    /// Gets a string setting.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tree.get(key.as_bytes())?.map(|sv| sv.value))
    }

    /// Removes a setting. Returns `true` if it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.tree.delete(key.as_bytes())
    }
}
