//! Module context and the factory that provisions it
//!
//! A context bundles everything a module may touch: its router namespace,
//! data directory, config store, logger, the shared event bus and the core
//! capability surface.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::module::api::config_store::ConfigStore;
use crate::module::api::events::{Event, EventBus};
use crate::module::api::router::{ModuleRouter, RouteTable};
use crate::module::sandbox::FileSystemSandbox;
use crate::module::traits::{CoreApi, ModuleError};
use crate::storage::{ReadOnlyStorage, SettingsStore};

/// Logger that tags every record with the owning module's ID
#[derive(Debug, Clone)]
pub struct ModuleLogger {
    module_id: String,
}

impl ModuleLogger {
    pub fn new(module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
        }
    }

    pub fn debug(&self, message: impl Display) {
        debug!(target: "proxy_panel::plugin", module = %self.module_id, "{}", message);
    }

    pub fn info(&self, message: impl Display) {
        info!(target: "proxy_panel::plugin", module = %self.module_id, "{}", message);
    }

    pub fn warn(&self, message: impl Display) {
        warn!(target: "proxy_panel::plugin", module = %self.module_id, "{}", message);
    }

    pub fn error(&self, message: impl Display) {
        error!(target: "proxy_panel::plugin", module = %self.module_id, "{}", message);
    }
}

/// Resources handed to a module at initialization
#[derive(Clone)]
pub struct ModuleContext {
    module_id: String,
    sandbox: FileSystemSandbox,
    router: ModuleRouter,
    events: Arc<EventBus>,
    config: ConfigStore,
    logger: ModuleLogger,
    core: Arc<dyn CoreApi>,
}

impl ModuleContext {
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Exclusive data directory; exists before `init` runs
    pub fn data_dir(&self) -> &Path {
        self.sandbox.allowed_path()
    }

    /// Resolve a path relative to the data directory, refusing escapes
    pub fn data_path<P: AsRef<Path>>(&self, relative: P) -> Result<PathBuf, ModuleError> {
        self.sandbox.validate_path(relative)
    }

    /// Authenticated routes under `/api/plugins/<id>`
    pub fn router(&self) -> &ModuleRouter {
        &self.router
    }

    /// Public routes under `/api/public/plugins/<id>`
    pub fn public_router(&self) -> ModuleRouter {
        self.router.public()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Publish an event with this module as the source
    pub fn emit(&self, event_type: &str, payload: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let mut event = Event::new(event_type, self.module_id.as_str());
        event.payload.extend(payload);
        self.events.publish(event);
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn logger(&self) -> &ModuleLogger {
        &self.logger
    }

    /// Host capability surface
    pub fn core(&self) -> &Arc<dyn CoreApi> {
        &self.core
    }

    /// Read-only handle to the shared database
    pub fn storage(&self) -> ReadOnlyStorage {
        self.core.storage()
    }
}

/// Builds contexts for enabled modules
pub struct ContextFactory {
    data_root: PathBuf,
    events: Arc<EventBus>,
    settings: Arc<SettingsStore>,
    routes: Arc<RouteTable>,
    core: Arc<dyn CoreApi>,
}

impl ContextFactory {
    pub fn new(
        data_root: impl Into<PathBuf>,
        events: Arc<EventBus>,
        settings: Arc<SettingsStore>,
        routes: Arc<RouteTable>,
        core: Arc<dyn CoreApi>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            events,
            settings,
            routes,
            core,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Directory owned by one module: `<data_root>/<id>`
    pub fn data_dir_for(&self, module_id: &str) -> PathBuf {
        self.data_root.join(module_id)
    }

    /// Create the module's data directory if absent
    pub fn prepare_data_dir(&self, module_id: &str) -> Result<PathBuf, ModuleError> {
        let dir = self.data_dir_for(module_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Assemble a fresh context for a module
    pub fn build(&self, module_id: &str) -> ModuleContext {
        ModuleContext {
            module_id: module_id.to_string(),
            sandbox: FileSystemSandbox::new(self.data_dir_for(module_id)),
            router: ModuleRouter::new(module_id, Arc::clone(&self.routes)),
            events: Arc::clone(&self.events),
            config: ConfigStore::new(module_id, Arc::clone(&self.settings)),
            logger: ModuleLogger::new(module_id),
            core: Arc::clone(&self.core),
        }
    }
}
