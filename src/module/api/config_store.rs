//! Per-module configuration store
//!
//! Every key is stored in the shared settings table as `"<module id>.<key>"`.
//! Module IDs cannot contain dots, so two namespaces never overlap.

use std::collections::HashMap;
use std::sync::Arc;

use crate::module::traits::ModuleError;
use crate::storage::SettingsStore;

#[derive(Clone)]
pub struct ConfigStore {
    prefix: String,
    settings: Arc<SettingsStore>,
}

impl ConfigStore {
    pub fn new(module_id: &str, settings: Arc<SettingsStore>) -> Self {
        Self {
            prefix: format!("{}.", module_id),
            settings,
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Stored value, or an empty string when the key is absent
    ///
    /// Use [`ConfigStore::contains`] to tell an absent key from an empty value.
    pub fn get(&self, key: &str) -> Result<String, ModuleError> {
        Ok(self.settings.get(&self.scoped(key))?.unwrap_or_default())
    }

    /// Stored value parsed with `FromStr`, falling back to `default` when absent or unparsable
    pub fn get_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ModuleError> {
        Ok(self
            .settings
            .get(&self.scoped(key))?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    pub fn contains(&self, key: &str) -> Result<bool, ModuleError> {
        Ok(self.settings.contains(&self.scoped(key))?)
    }

    /// Insert or replace
    pub fn set(&self, key: &str, value: &str) -> Result<(), ModuleError> {
        Ok(self.settings.set(&self.scoped(key), value)?)
    }

    pub fn delete(&self, key: &str) -> Result<(), ModuleError> {
        Ok(self.settings.delete(&self.scoped(key))?)
    }

    /// Every key of this module, prefix stripped
    pub fn all(&self) -> Result<HashMap<String, String>, ModuleError> {
        Ok(self
            .settings
            .scan_prefix(&self.prefix)?
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&self.prefix).map(|k| (k.to_string(), v)))
            .collect())
    }
}
