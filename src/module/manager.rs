//! Module manager for orchestrating all modules
//!
//! Drives registration, dependency resolution and the init/start/stop
//! lifecycle, and serves the management operations (list, enable, disable).
//!
//! Registry, load order and per-module state live in one `ManagerState`
//! behind a single lock. The lock is never held while a module method runs,
//! so management calls stay responsive during an orchestration pass.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, info_span, warn, Instrument};

use crate::module::api::context::ContextFactory;
use crate::module::registry::{ModuleHandle, ModuleRegistry};
use crate::module::traits::{FrontendManifest, Module, ModuleError, ModuleMetadata, ModuleState};
use crate::storage::Storage;

/// Module as reported to the management surface
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub metadata: ModuleMetadata,
    pub enabled: bool,
    pub state: ModuleState,
}

struct ManagerState {
    registry: ModuleRegistry,
    /// Load order computed by the most recent successful `init_all`
    load_order: Vec<String>,
    /// Modules initialized in the current pass, in load order
    active: Vec<String>,
    states: HashMap<String, ModuleState>,
}

/// Module manager coordinates all registered modules
pub struct ModuleManager {
    state: RwLock<ManagerState>,
    storage: Arc<Storage>,
    contexts: ContextFactory,
}

impl ModuleManager {
    pub fn new(storage: Arc<Storage>, contexts: ContextFactory) -> Self {
        Self {
            state: RwLock::new(ManagerState {
                registry: ModuleRegistry::new(),
                load_order: Vec::new(),
                active: Vec::new(),
                states: HashMap::new(),
            }),
            storage,
            contexts,
        }
    }

    /// Register a module before the first orchestration pass
    pub async fn register(&self, module: Box<dyn Module>) -> Result<(), ModuleError> {
        let mut state = self.state.write().await;
        let metadata = state.registry.register(module)?;
        info!("Registered module {} v{}", metadata.id, metadata.version);
        state.states.insert(metadata.id, ModuleState::Registered);
        Ok(())
    }

    /// Compute the load order without touching any module
    pub async fn resolve(&self) -> Result<Vec<String>, ModuleError> {
        let state = self.state.read().await;
        Ok(state.registry.resolve()?.load_order)
    }

    /// Initialize every enabled module in load order
    ///
    /// Resolution errors are reported before any module is touched. The first
    /// init failure aborts the pass; modules initialized before it are not
    /// rolled back.
    ///
    /// Refused while modules of a previous pass are still active: a live
    /// module never gets a second context. Run `stop_all` first.
    pub async fn init_all(&self) -> Result<(), ModuleError> {
        let plan = {
            let mut state = self.state.write().await;
            if !state.active.is_empty() {
                warn!(
                    "Refusing orchestration pass: {} module(s) still active",
                    state.active.len()
                );
                return Err(ModuleError::OperationError(
                    "modules still active; run stop_all first".to_string(),
                ));
            }
            let resolution = state.registry.resolve()?;
            // Enablement is read once per pass
            let enablement = self.storage.plugin_states().snapshot()?;

            let mut plan = Vec::with_capacity(resolution.load_order.len());
            for id in &resolution.load_order {
                if let Some(registered) = state.registry.get(id) {
                    let enabled = enablement.get(id).copied().unwrap_or(true);
                    plan.push((
                        registered.metadata.clone(),
                        Arc::clone(&registered.instance),
                        enabled,
                    ));
                }
            }

            state.load_order = resolution.load_order;
            plan
        };

        info!("Initializing {} module(s)", plan.len());

        for (metadata, instance, enabled) in plan {
            let id = metadata.id.clone();
            if !enabled {
                info!("Module {} is disabled, skipping", id);
                self.set_state(&id, ModuleState::Disabled).await;
                continue;
            }

            if let Err(e) = self.init_one(&metadata, &instance).await {
                error!("Module {} v{} failed to initialize: {}", id, metadata.version, e);
                self.set_state(&id, ModuleState::Failed(e.to_string())).await;
                return Err(ModuleError::InitFailed {
                    id,
                    version: metadata.version,
                    source: Box::new(e),
                });
            }

            let mut state = self.state.write().await;
            state.active.push(id.clone());
            state.states.insert(id, ModuleState::Initialized);
        }

        Ok(())
    }

    async fn init_one(
        &self,
        metadata: &ModuleMetadata,
        instance: &ModuleHandle,
    ) -> Result<(), ModuleError> {
        self.contexts.prepare_data_dir(&metadata.id)?;
        let context = self.contexts.build(&metadata.id);

        let span = info_span!("module_init", module = %metadata.id);
        let mut module = instance.lock().await;
        module.init(context).instrument(span).await?;
        info!("Module {} v{} initialized", metadata.id, metadata.version);
        Ok(())
    }

    /// Start every module initialized in this pass, in load order
    ///
    /// The first failure aborts; already started modules keep running.
    pub async fn start_all(&self) -> Result<(), ModuleError> {
        for (id, instance) in self.active_modules().await {
            let span = info_span!("module_start", module = %id);
            let result = {
                let mut module = instance.lock().await;
                module.start().instrument(span).await
            };

            match result {
                Ok(()) => {
                    info!("Module {} started", id);
                    self.set_state(&id, ModuleState::Running).await;
                }
                Err(e) => {
                    error!("Module {} failed to start: {}", id, e);
                    self.set_state(&id, ModuleState::Failed(e.to_string())).await;
                    return Err(ModuleError::StartFailed {
                        id,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(())
    }

    /// Stop every module of this pass in reverse load order
    ///
    /// Best effort: failures are logged and returned, and never cut the sweep short.
    pub async fn stop_all(&self) -> Vec<ModuleError> {
        let mut failures = Vec::new();
        let mut active = self.active_modules().await;
        active.reverse();

        for (id, instance) in active {
            let span = info_span!("module_stop", module = %id);
            let result = {
                let mut module = instance.lock().await;
                module.stop().instrument(span).await
            };

            match result {
                Ok(()) => {
                    info!("Module {} stopped", id);
                    self.set_state(&id, ModuleState::Stopped).await;
                }
                Err(e) => {
                    warn!("Module {} failed to stop cleanly: {}", id, e);
                    self.set_state(&id, ModuleState::Failed(e.to_string())).await;
                    failures.push(ModuleError::StopFailed {
                        id,
                        source: Box::new(e),
                    });
                }
            }
        }

        self.state.write().await.active.clear();
        failures
    }

    /// Persist an enabled flag; takes effect on the next pass
    pub async fn enable(&self, id: &str) -> Result<(), ModuleError> {
        self.set_enabled(id, true).await
    }

    /// Persist a disabled flag; takes effect on the next pass
    pub async fn disable(&self, id: &str) -> Result<(), ModuleError> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), ModuleError> {
        let state = self.state.read().await;
        if !state.registry.contains(id) {
            return Err(ModuleError::ModuleNotFound(id.to_string()));
        }
        self.storage.plugin_states().set_enabled(id, enabled)?;
        info!(
            "Module {} {} (effective on next start)",
            id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// All registered modules with their persisted flag and current state, sorted by ID
    pub async fn list_modules(&self) -> Result<Vec<ModuleInfo>, ModuleError> {
        let state = self.state.read().await;
        let enablement = self.storage.plugin_states().snapshot()?;

        Ok(state
            .registry
            .metadata()
            .into_iter()
            .map(|metadata| ModuleInfo {
                enabled: enablement.get(&metadata.id).copied().unwrap_or(true),
                state: state
                    .states
                    .get(&metadata.id)
                    .cloned()
                    .unwrap_or(ModuleState::Registered),
                metadata: metadata.clone(),
            })
            .collect())
    }

    /// Frontend manifests of enabled modules, in load order
    pub async fn frontend_manifests(&self) -> Result<Vec<FrontendManifest>, ModuleError> {
        let state = self.state.read().await;
        let order = state.registry.resolve()?.load_order;
        let enablement = self.storage.plugin_states().snapshot()?;

        Ok(order
            .iter()
            .filter(|id| enablement.get(*id).copied().unwrap_or(true))
            .filter_map(|id| state.registry.get(id).and_then(|m| m.frontend.clone()))
            .collect())
    }

    /// Load order recorded by the most recent `init_all`
    pub async fn load_order(&self) -> Vec<String> {
        self.state.read().await.load_order.clone()
    }

    pub async fn module_state(&self, id: &str) -> Option<ModuleState> {
        self.state.read().await.states.get(id).cloned()
    }

    async fn active_modules(&self) -> Vec<(String, ModuleHandle)> {
        let state = self.state.read().await;
        state
            .active
            .iter()
            .filter_map(|id| {
                state
                    .registry
                    .get(id)
                    .map(|m| (id.clone(), Arc::clone(&m.instance)))
            })
            .collect()
    }

    async fn set_state(&self, id: &str, new_state: ModuleState) {
        self.state
            .write()
            .await
            .states
            .insert(id.to_string(), new_state);
    }
}
