//! Core API implementation for modules
//!
//! Backs the [`CoreApi`] capability surface with panel storage and announces
//! proxy changes on the event bus.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::module::api::events::{Event, EventBus};
use crate::module::traits::{CoreApi, ModuleError, NewProxyHost};
use crate::storage::{ProxyHost, ReadOnlyStorage, Storage};
use crate::utils::time::current_timestamp;

/// Source tag for events published by the panel itself
pub const CORE_SOURCE: &str = "core";

/// Applies the current proxy host set to the running reverse proxy
///
/// Config generation and process supervision live outside the panel core.
#[async_trait]
pub trait ProxyReloader: Send + Sync {
    async fn reload(&self, hosts: &[ProxyHost]) -> anyhow::Result<()>;
}

/// Reloads by running an external command, e.g. `nginx -s reload`
pub struct CommandReloader {
    command: Option<Vec<String>>,
}

impl CommandReloader {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.filter(|c| !c.is_empty()),
        }
    }
}

#[async_trait]
impl ProxyReloader for CommandReloader {
    async fn reload(&self, hosts: &[ProxyHost]) -> anyhow::Result<()> {
        let Some(command) = &self.command else {
            info!(
                "No proxy reload command configured, skipping reload of {} host(s)",
                hosts.len()
            );
            return Ok(());
        };

        let output = tokio::process::Command::new(&command[0])
            .args(&command[1..])
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "reload command {:?} exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!("Proxy reload command {:?} succeeded", command);
        Ok(())
    }
}

/// Core API implementation handed to every module context
pub struct CoreApiImpl {
    storage: Arc<Storage>,
    events: Arc<EventBus>,
    reloader: Arc<dyn ProxyReloader>,
}

impl CoreApiImpl {
    pub fn new(
        storage: Arc<Storage>,
        events: Arc<EventBus>,
        reloader: Arc<dyn ProxyReloader>,
    ) -> Self {
        Self {
            storage,
            events,
            reloader,
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ModuleError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Storage>) -> anyhow::Result<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || f(storage))
            .await
            .map_err(|e| ModuleError::OperationError(format!("Task join error: {e}")))?
            .map_err(ModuleError::from)
    }
}

#[async_trait]
impl CoreApi for CoreApiImpl {
    async fn create_proxy_host(&self, request: NewProxyHost) -> Result<u64, ModuleError> {
        if request.domain.trim().is_empty() {
            return Err(ModuleError::OperationError("Domain cannot be empty".to_string()));
        }
        if request.upstream.trim().is_empty() {
            return Err(ModuleError::OperationError("Upstream cannot be empty".to_string()));
        }

        let host = ProxyHost {
            id: 0,
            domain: request.domain.trim().to_string(),
            upstream: request.upstream.trim().to_string(),
            ssl: request.ssl,
            force_https: request.force_https,
            websocket: request.websocket,
            created_at: current_timestamp(),
        };
        let domain = host.domain.clone();
        let id = self
            .blocking(move |storage| storage.proxy_hosts().insert(host))
            .await?;

        info!("Created proxy host {} for {}", id, domain);
        self.events.publish(
            Event::new("proxy_host.created", CORE_SOURCE)
                .with("id", id)
                .with("domain", domain),
        );
        Ok(id)
    }

    async fn delete_proxy_host(&self, id: u64) -> Result<(), ModuleError> {
        let removed = self
            .blocking(move |storage| storage.proxy_hosts().remove(id))
            .await?;
        if !removed {
            return Err(ModuleError::OperationError(format!(
                "Proxy host {} not found",
                id
            )));
        }

        info!("Deleted proxy host {}", id);
        self.events
            .publish(Event::new("proxy_host.deleted", CORE_SOURCE).with("id", id));
        Ok(())
    }

    async fn reload_proxy(&self) -> Result<(), ModuleError> {
        let hosts = self
            .blocking(|storage| storage.proxy_hosts().list())
            .await?;
        self.reloader
            .reload(&hosts)
            .await
            .map_err(|e| ModuleError::OperationError(format!("Proxy reload failed: {:#}", e)))?;

        self.events
            .publish(Event::new("proxy.reloaded", CORE_SOURCE).with("hosts", hosts.len()));
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, ModuleError> {
        Ok(self.storage.settings().get(key)?)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), ModuleError> {
        Ok(self.storage.settings().set(key, value)?)
    }

    fn storage(&self) -> ReadOnlyStorage {
        self.storage.read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::api::events::WILDCARD;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct CountingReloader(Mutex<Vec<usize>>);

    #[async_trait]
    impl ProxyReloader for CountingReloader {
        async fn reload(&self, hosts: &[ProxyHost]) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(hosts.len());
            Ok(())
        }
    }

    fn new_host(domain: &str) -> NewProxyHost {
        NewProxyHost {
            domain: domain.to_string(),
            upstream: "127.0.0.1:3000".to_string(),
            ssl: false,
            force_https: false,
            websocket: true,
        }
    }

    #[tokio::test]
    async fn test_proxy_host_lifecycle_publishes_events() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let reloader = Arc::new(CountingReloader(Mutex::new(Vec::new())));
        let api = CoreApiImpl::new(Arc::clone(&storage), Arc::clone(&events), reloader.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        events.subscribe(WILDCARD, move |e| {
            s.lock().unwrap().push(e.event_type.clone());
            Ok(())
        });

        let id = api.create_proxy_host(new_host("app.example.com")).await.unwrap();
        api.reload_proxy().await.unwrap();
        api.delete_proxy_host(id).await.unwrap();
        assert!(api.delete_proxy_host(id).await.is_err());

        assert_eq!(*reloader.0.lock().unwrap(), vec![1]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["proxy_host.created", "proxy.reloaded", "proxy_host.deleted"]
        );
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path()).unwrap());
        let api = CoreApiImpl::new(
            storage,
            Arc::new(EventBus::new()),
            Arc::new(CommandReloader::new(None)),
        );

        let mut req = new_host("  ");
        assert!(api.create_proxy_host(req.clone()).await.is_err());
        req.domain = "ok.example.com".to_string();
        req.upstream = String::new();
        assert!(api.create_proxy_host(req).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_and_read_only_storage() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path()).unwrap());
        let api = CoreApiImpl::new(
            storage,
            Arc::new(EventBus::new()),
            Arc::new(CommandReloader::new(Some(Vec::new()))),
        );

        assert!(api.get_setting("letsencrypt_email").await.unwrap().is_none());
        api.set_setting("letsencrypt_email", "ops@example.com").await.unwrap();
        assert_eq!(
            api.get_setting("letsencrypt_email").await.unwrap().as_deref(),
            Some("ops@example.com")
        );
        assert_eq!(api.storage().scan("settings").unwrap().len(), 1);
        api.reload_proxy().await.unwrap();
    }
}
