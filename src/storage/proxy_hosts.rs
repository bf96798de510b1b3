//! Reverse-proxy host storage
//!
//! Rows are JSON-encoded [`ProxyHost`] values keyed by big-endian id, so a
//! table scan yields hosts in creation order.

use crate::storage::database::{Database, Tree, PROXY_HOSTS_TABLE};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A reverse-proxy entry as consumed by the config generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHost {
    pub id: u64,
    pub domain: String,
    /// Upstream address, e.g. `127.0.0.1:3000`
    pub upstream: String,
    pub ssl: bool,
    /// Redirect plain HTTP to HTTPS
    pub force_https: bool,
    pub websocket: bool,
    /// Unix seconds
    pub created_at: u64,
}

pub struct ProxyHostStore {
    tree: Arc<dyn Tree>,
    /// Serializes id allocation
    id_lock: Mutex<()>,
}

impl ProxyHostStore {
    pub fn new(db: Arc<dyn Database>) -> Result<Self> {
        let tree = Arc::from(db.open_tree(PROXY_HOSTS_TABLE)?);
        Ok(Self {
            tree,
            id_lock: Mutex::new(()),
        })
    }

    /// Store a new host, assigning the next free id
    pub fn insert(&self, mut host: ProxyHost) -> Result<u64> {
        let _guard = self
            .id_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("proxy host id lock poisoned"))?;

        let next_id = self.max_id()? + 1;
        host.id = next_id;
        let value = serde_json::to_vec(&host)?;
        self.tree.insert(&next_id.to_be_bytes(), &value)?;
        Ok(next_id)
    }

    pub fn get(&self, id: u64) -> Result<Option<ProxyHost>> {
        match self.tree.get(&id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a host. Returns whether a row existed.
    pub fn remove(&self, id: u64) -> Result<bool> {
        let key = id.to_be_bytes();
        if !self.tree.contains_key(&key)? {
            return Ok(false);
        }
        self.tree.remove(&key)?;
        Ok(true)
    }

    pub fn list(&self) -> Result<Vec<ProxyHost>> {
        self.tree
            .entries()?
            .iter()
            .map(|(_, value)| -> Result<ProxyHost> { Ok(serde_json::from_slice(value)?) })
            .collect()
    }

    fn max_id(&self) -> Result<u64> {
        let mut max = 0u64;
        for (key, _) in self.tree.entries()? {
            let bytes: [u8; 8] = key
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("corrupt proxy host key ({} bytes)", key.len()))?;
            max = max.max(u64::from_be_bytes(bytes));
        }
        Ok(max)
    }
}
