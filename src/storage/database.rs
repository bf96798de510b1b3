//! Database abstraction layer
//!
//! A small key/value interface over the embedded engines (sled, redb),
//! selected via feature flags. The panel only ever opens the tables listed
//! in [`ALL_TABLES`].

use anyhow::Result;
use std::path::Path;

/// Table holding the module enablement records (module id -> flag)
pub const PLUGIN_STATES_TABLE: &str = "plugin_states";
/// Shared key/value table for global settings and module config stores
pub const SETTINGS_TABLE: &str = "settings";
/// Reverse-proxy host entries created through the capability surface
pub const PROXY_HOSTS_TABLE: &str = "proxy_hosts";

/// Every table the panel knows about
pub const ALL_TABLES: [&str; 3] = [PLUGIN_STATES_TABLE, SETTINGS_TABLE, PROXY_HOSTS_TABLE];

/// Raw key/value pair as stored
pub type Entry = (Vec<u8>, Vec<u8>);

/// Storage engine handle
pub trait Database: Send + Sync {
    /// Open one of the known tables
    fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>>;

    /// Flush all pending writes
    fn flush(&self) -> Result<()>;
}

/// A named table of byte keys and values
///
/// Every call is its own transaction.
pub trait Tree: Send + Sync {
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn remove(&self, key: &[u8]) -> Result<()>;

    fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Snapshot of every entry, in key order
    fn entries(&self) -> Result<Vec<Entry>>;

    /// Entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        let mut rows = self.entries()?;
        rows.retain(|(key, _)| key.starts_with(prefix));
        Ok(rows)
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }
}

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sled,
    Redb,
}

/// Open (creating if needed) a database of the given backend under `data_dir`
pub fn create_database<P: AsRef<Path>>(
    data_dir: P,
    backend: DatabaseBackend,
) -> Result<Box<dyn Database>> {
    std::fs::create_dir_all(data_dir.as_ref())?;
    match backend {
        #[cfg(feature = "sled")]
        DatabaseBackend::Sled => Ok(Box::new(sled_impl::SledDatabase::open(data_dir.as_ref())?)),
        #[cfg(not(feature = "sled"))]
        DatabaseBackend::Sled => Err(anyhow::anyhow!(
            "Sled backend not available (feature not enabled)"
        )),
        #[cfg(feature = "redb")]
        DatabaseBackend::Redb => Ok(Box::new(redb_impl::RedbDatabase::open(data_dir.as_ref())?)),
        #[cfg(not(feature = "redb"))]
        DatabaseBackend::Redb => Err(anyhow::anyhow!(
            "Redb backend not available (feature not enabled)"
        )),
    }
}

/// Preferred backend: redb when compiled in, otherwise sled
pub fn default_backend() -> DatabaseBackend {
    if cfg!(feature = "redb") || !cfg!(feature = "sled") {
        DatabaseBackend::Redb
    } else {
        DatabaseBackend::Sled
    }
}

/// The other backend, if it is compiled in
pub fn fallback_backend(primary: DatabaseBackend) -> Option<DatabaseBackend> {
    match primary {
        DatabaseBackend::Redb if cfg!(feature = "sled") => Some(DatabaseBackend::Sled),
        DatabaseBackend::Sled if cfg!(feature = "redb") => Some(DatabaseBackend::Redb),
        _ => None,
    }
}

#[cfg(feature = "sled")]
mod sled_impl {
    use super::{Database, Entry, Tree};
    use anyhow::Result;
    use std::path::Path;

    pub struct SledDatabase {
        db: sled::Db,
    }

    impl SledDatabase {
        pub fn open(data_dir: &Path) -> Result<Self> {
            Ok(Self {
                db: sled::open(data_dir.join("sled"))?,
            })
        }
    }

    impl Database for SledDatabase {
        fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>> {
            Ok(Box::new(SledTree(self.db.open_tree(name)?)))
        }

        fn flush(&self) -> Result<()> {
            self.db.flush()?;
            Ok(())
        }
    }

    /// `sled::Tree` is itself a cheap shared handle
    struct SledTree(sled::Tree);

    fn to_entries(
        rows: impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    ) -> Result<Vec<Entry>> {
        rows.map(|row| {
            let (k, v) = row?;
            Ok((k.to_vec(), v.to_vec()))
        })
        .collect()
    }

    impl Tree for SledTree {
        fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.0.insert(key, value)?;
            Ok(())
        }

        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(key)?.map(|v| v.to_vec()))
        }

        fn remove(&self, key: &[u8]) -> Result<()> {
            self.0.remove(key)?;
            Ok(())
        }

        fn contains_key(&self, key: &[u8]) -> Result<bool> {
            Ok(self.0.contains_key(key)?)
        }

        fn entries(&self) -> Result<Vec<Entry>> {
            to_entries(self.0.iter())
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
            to_entries(self.0.scan_prefix(prefix))
        }

        fn is_empty(&self) -> Result<bool> {
            Ok(self.0.is_empty())
        }
    }
}

#[cfg(feature = "redb")]
mod redb_impl {
    use super::{Database, Entry, Tree};
    use anyhow::Result;
    use redb::{ReadOnlyTable, ReadableTable, Table, TableDefinition};
    use std::path::Path;
    use std::sync::Arc;

    type Raw = &'static [u8];
    type Definition = TableDefinition<'static, Raw, Raw>;

    // redb tables are typed and must be known statically
    const PLUGIN_STATES: Definition = TableDefinition::new(super::PLUGIN_STATES_TABLE);
    const SETTINGS: Definition = TableDefinition::new(super::SETTINGS_TABLE);
    const PROXY_HOSTS: Definition = TableDefinition::new(super::PROXY_HOSTS_TABLE);

    fn definition(name: &str) -> Option<Definition> {
        match name {
            super::PLUGIN_STATES_TABLE => Some(PLUGIN_STATES),
            super::SETTINGS_TABLE => Some(SETTINGS),
            super::PROXY_HOSTS_TABLE => Some(PROXY_HOSTS),
            _ => None,
        }
    }

    pub struct RedbDatabase {
        db: Arc<redb::Database>,
    }

    impl RedbDatabase {
        pub fn open(data_dir: &Path) -> Result<Self> {
            let path = data_dir.join("panel.redb");
            let db = if path.exists() {
                redb::Database::open(&path)?
            } else {
                redb::Database::create(&path)?
            };

            // Create every table up front so read transactions always find them
            let txn = db.begin_write()?;
            for table in [PLUGIN_STATES, SETTINGS, PROXY_HOSTS] {
                txn.open_table(table)?;
            }
            txn.commit()?;

            Ok(Self { db: Arc::new(db) })
        }
    }

    impl Database for RedbDatabase {
        fn open_tree(&self, name: &str) -> Result<Box<dyn Tree>> {
            let table =
                definition(name).ok_or_else(|| anyhow::anyhow!("Unknown table name: {}", name))?;
            Ok(Box::new(RedbTree {
                db: Arc::clone(&self.db),
                table,
            }))
        }

        fn flush(&self) -> Result<()> {
            // Commits are durable; an empty commit is a sync point
            self.db.begin_write()?.commit()?;
            Ok(())
        }
    }

    struct RedbTree {
        db: Arc<redb::Database>,
        table: Definition,
    }

    impl RedbTree {
        fn read<T>(&self, f: impl FnOnce(&ReadOnlyTable<'_, Raw, Raw>) -> Result<T>) -> Result<T> {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(self.table)?;
            f(&table)
        }

        fn write<T>(&self, f: impl FnOnce(&mut Table<'_, '_, Raw, Raw>) -> Result<T>) -> Result<T> {
            let txn = self.db.begin_write()?;
            let out = {
                let mut table = txn.open_table(self.table)?;
                f(&mut table)?
            };
            txn.commit()?;
            Ok(out)
        }
    }

    impl Tree for RedbTree {
        fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.write(|table| {
                table.insert(key, value)?;
                Ok(())
            })
        }

        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            self.read(|table| Ok(table.get(key)?.map(|v| v.value().to_vec())))
        }

        fn remove(&self, key: &[u8]) -> Result<()> {
            self.write(|table| {
                table.remove(key)?;
                Ok(())
            })
        }

        fn entries(&self) -> Result<Vec<Entry>> {
            self.read(|table| {
                let mut rows = Vec::new();
                for row in table.range::<&[u8]>(..)? {
                    let (k, v) = row?;
                    rows.push((k.value().to_vec(), v.value().to_vec()));
                }
                Ok(rows)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_backend_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = create_database(dir.path(), default_backend()).unwrap();
        let tree = db.open_tree(SETTINGS_TABLE).unwrap();

        tree.insert(b"site.title", b"panel").unwrap();
        assert_eq!(tree.get(b"site.title").unwrap(), Some(b"panel".to_vec()));
        assert!(tree.contains_key(b"site.title").unwrap());

        tree.remove(b"site.title").unwrap();
        assert!(tree.get(b"site.title").unwrap().is_none());
        assert!(tree.is_empty().unwrap());
    }

    #[test]
    fn test_scan_prefix_filters_keys() {
        let dir = TempDir::new().unwrap();
        let db = create_database(dir.path(), default_backend()).unwrap();
        let tree = db.open_tree(SETTINGS_TABLE).unwrap();

        tree.insert(b"docker.socket", b"/var/run/docker.sock").unwrap();
        tree.insert(b"docker.timeout", b"30").unwrap();
        tree.insert(b"dockerx.other", b"1").unwrap();

        let rows = tree.scan_prefix(b"docker.").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"docker.socket".to_vec());
    }

    #[test]
    fn test_entries_are_key_ordered() {
        let dir = TempDir::new().unwrap();
        let db = create_database(dir.path(), default_backend()).unwrap();
        let tree = db.open_tree(PLUGIN_STATES_TABLE).unwrap();

        tree.insert(b"b", b"1").unwrap();
        tree.insert(b"a", b"0").unwrap();

        let keys: Vec<Vec<u8>> = tree.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_unknown_table_rejected_on_redb() {
        let dir = TempDir::new().unwrap();
        if let Ok(db) = create_database(dir.path(), DatabaseBackend::Redb) {
            assert!(db.open_tree("blocks").is_err());
        }
    }

    #[test]
    fn test_fallback_is_the_other_backend() {
        if let Some(fallback) = fallback_backend(DatabaseBackend::Redb) {
            assert_eq!(fallback, DatabaseBackend::Sled);
        }
        assert_ne!(fallback_backend(DatabaseBackend::Sled), Some(DatabaseBackend::Sled));
    }
}
