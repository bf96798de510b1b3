//! Shared key/value settings table
//!
//! Global settings and every module's config store live in the same table;
//! module stores keep to their own `"<id>."` prefix.

use crate::storage::database::{Database, Tree, SETTINGS_TABLE};
use anyhow::Result;
use std::sync::Arc;

pub struct SettingsStore {
    tree: Arc<dyn Tree>,
}

impl SettingsStore {
    pub fn new(db: Arc<dyn Database>) -> Result<Self> {
        let tree = Arc::from(db.open_tree(SETTINGS_TABLE)?);
        Ok(Self { tree })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .tree
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Insert or replace a value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(key.as_bytes(), value.as_bytes())
    }

    /// Remove a key; removing a missing key is not an error
    pub fn delete(&self, key: &str) -> Result<()> {
        self.tree.remove(key.as_bytes())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.tree.contains_key(key.as_bytes())
    }

    /// All (key, value) pairs whose key starts with `prefix`, keys unchanged
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .tree
            .scan_prefix(prefix.as_bytes())?
            .into_iter()
            .map(|(k, v)| {
                (
                    String::from_utf8_lossy(&k).into_owned(),
                    String::from_utf8_lossy(&v).into_owned(),
                )
            })
            .collect())
    }
}
