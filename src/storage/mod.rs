//! Storage layer for proxy-panel
//!
//! This module provides persistent storage for module enablement records,
//! shared settings (including every module's config store) and proxy hosts.
//! Supports multiple database backends via feature flags (sled, redb).

pub mod database;
pub mod plugin_state;
pub mod proxy_hosts;
pub mod settings;

use anyhow::Result;
use database::{
    create_database, default_backend, fallback_backend, Database, DatabaseBackend, Entry,
    ALL_TABLES,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use plugin_state::PluginStateStore;
pub use proxy_hosts::{ProxyHost, ProxyHostStore};
pub use settings::SettingsStore;

/// Storage manager that coordinates all storage operations
pub struct Storage {
    db: Arc<dyn Database>,
    plugin_states: Arc<PluginStateStore>,
    settings: Arc<SettingsStore>,
    proxy_hosts: Arc<ProxyHostStore>,
}

impl Storage {
    /// Create a new storage instance with default backend
    ///
    /// Attempts to use the default backend (redb), and gracefully falls back
    /// to sled if redb fails and sled is available.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let default = default_backend();

        match Self::with_backend(data_dir.as_ref(), default) {
            Ok(storage) => Ok(storage),
            Err(e) => {
                if let Some(fallback_backend) = fallback_backend(default) {
                    warn!(
                        "Failed to initialize {:?} backend: {}. Falling back to {:?}.",
                        default, e, fallback_backend
                    );
                    Self::with_backend(data_dir, fallback_backend)
                } else {
                    Err(anyhow::anyhow!(
                        "Failed to initialize {:?} backend: {}. No fallback backend available.",
                        default,
                        e
                    ))
                }
            }
        }
    }

    /// Create a new storage instance with specified backend
    pub fn with_backend<P: AsRef<Path>>(data_dir: P, backend: DatabaseBackend) -> Result<Self> {
        let db: Arc<dyn Database> = Arc::from(create_database(data_dir.as_ref(), backend)?);

        let plugin_states = Arc::new(PluginStateStore::new(Arc::clone(&db))?);
        let settings = Arc::new(SettingsStore::new(Arc::clone(&db))?);
        let proxy_hosts = Arc::new(ProxyHostStore::new(Arc::clone(&db))?);

        info!(
            "Storage opened at {} using {:?} backend",
            data_dir.as_ref().display(),
            backend
        );

        Ok(Self {
            db,
            plugin_states,
            settings,
            proxy_hosts,
        })
    }

    /// Module enablement records
    pub fn plugin_states(&self) -> &Arc<PluginStateStore> {
        &self.plugin_states
    }

    /// Shared key/value settings table
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Reverse-proxy host entries
    pub fn proxy_hosts(&self) -> &Arc<ProxyHostStore> {
        &self.proxy_hosts
    }

    /// Read-only view handed to modules through the capability surface
    pub fn read_only(&self) -> ReadOnlyStorage {
        ReadOnlyStorage {
            db: Arc::clone(&self.db),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }
}

/// Read-oriented handle over the shared database
///
/// Modules can look at core tables but never write to them.
#[derive(Clone)]
pub struct ReadOnlyStorage {
    db: Arc<dyn Database>,
}

impl ReadOnlyStorage {
    /// Read a single raw value from a named table
    pub fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Self::check_table(table)?;
        self.db.open_tree(table)?.get(key)
    }

    /// Read every row of a named table
    pub fn scan(&self, table: &str) -> Result<Vec<Entry>> {
        Self::check_table(table)?;
        self.db.open_tree(table)?.entries()
    }

    fn check_table(table: &str) -> Result<()> {
        if ALL_TABLES.contains(&table) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Unknown table: {}", table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_opens_all_stores() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).unwrap();

        storage.settings().set("site.title", "panel").unwrap();
        storage.plugin_states().set_enabled("docker", false).unwrap();

        assert_eq!(
            storage.settings().get("site.title").unwrap().as_deref(),
            Some("panel")
        );
        assert_eq!(storage.plugin_states().is_enabled("docker").unwrap(), false);
        storage.flush().unwrap();
    }

    #[test]
    fn test_read_only_view_sees_writes() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        storage.settings().set("acme.email", "ops@example.com").unwrap();

        let view = storage.read_only();
        let value = view
            .get(database::SETTINGS_TABLE, b"acme.email")
            .unwrap()
            .unwrap();
        assert_eq!(value, b"ops@example.com".to_vec());
        assert_eq!(view.scan(database::SETTINGS_TABLE).unwrap().len(), 1);
        assert!(view.scan("users").is_err());
    }
}
