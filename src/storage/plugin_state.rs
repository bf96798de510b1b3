//! Module enablement records
//!
//! One row per module ID that an operator has toggled. A missing row means
//! the module is enabled.

use crate::storage::database::{Database, Tree, PLUGIN_STATES_TABLE};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

const ENABLED: &[u8] = b"1";
const DISABLED: &[u8] = b"0";

/// Persisted module id -> enabled flag
pub struct PluginStateStore {
    tree: Arc<dyn Tree>,
}

impl PluginStateStore {
    pub fn new(db: Arc<dyn Database>) -> Result<Self> {
        let tree = Arc::from(db.open_tree(PLUGIN_STATES_TABLE)?);
        Ok(Self { tree })
    }

    /// Whether the module is enabled (default-allow when no record exists)
    pub fn is_enabled(&self, module_id: &str) -> Result<bool> {
        Ok(self
            .tree
            .get(module_id.as_bytes())?
            .map(|v| v.as_slice() != DISABLED)
            .unwrap_or(true))
    }

    /// Upsert the record for a module
    pub fn set_enabled(&self, module_id: &str, enabled: bool) -> Result<()> {
        let value = if enabled { ENABLED } else { DISABLED };
        self.tree.insert(module_id.as_bytes(), value)
    }

    /// Every stored record
    ///
    /// Modules without a record are not listed; callers treat them as enabled.
    pub fn snapshot(&self) -> Result<HashMap<String, bool>> {
        let mut out = HashMap::new();
        for (key, value) in self.tree.entries()? {
            let id = String::from_utf8_lossy(&key).into_owned();
            out.insert(id, value.as_slice() != DISABLED);
        }
        Ok(out)
    }
}
