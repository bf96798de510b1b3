//! Shared fixture for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use proxy_panel::module::api::{CommandReloader, ContextFactory, CoreApiImpl, EventBus, RouteTable};
use proxy_panel::module::{Module, ModuleContext, ModuleError, ModuleManager, ModuleMetadata};
use proxy_panel::storage::Storage;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Ordered record of lifecycle calls, shared by all spies of a test
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Calls of one kind (`init`, `start`, `stop`) in the order they happened
pub fn calls(log: &CallLog, kind: &str) -> Vec<String> {
    let prefix = format!("{}:", kind);
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

/// Module that records every lifecycle call and can be told to fail
pub struct SpyModule {
    metadata: ModuleMetadata,
    log: CallLog,
    fail_init: bool,
    fail_start: bool,
    fail_stop: bool,
}

impl SpyModule {
    pub fn new(id: &str, log: &CallLog) -> Self {
        Self {
            metadata: ModuleMetadata::new(id, id.to_uppercase(), "1.0.0"),
            log: Arc::clone(log),
            fail_init: false,
            fail_start: false,
            fail_stop: false,
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.metadata = self.metadata.with_dependency(id);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.metadata = self.metadata.with_priority(priority);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    fn record(&self, kind: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", kind, self.metadata.id));
    }
}

#[async_trait]
impl Module for SpyModule {
    fn metadata(&self) -> ModuleMetadata {
        self.metadata.clone()
    }

    async fn init(&mut self, context: ModuleContext) -> Result<(), ModuleError> {
        self.record("init");
        if !context.data_dir().is_dir() {
            return Err(ModuleError::OperationError("data dir missing".into()));
        }
        if self.fail_init {
            return Err(ModuleError::OperationError("init refused".into()));
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ModuleError> {
        self.record("start");
        if self.fail_start {
            return Err(ModuleError::OperationError("start refused".into()));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ModuleError> {
        self.record("stop");
        if self.fail_stop {
            return Err(ModuleError::OperationError("stop refused".into()));
        }
        Ok(())
    }
}

/// Storage, bus, routes and a manager rooted in a temp dir
pub struct PanelFixture {
    pub dir: TempDir,
    pub storage: Arc<Storage>,
    pub events: Arc<EventBus>,
    pub routes: Arc<RouteTable>,
    pub manager: ModuleManager,
}

impl PanelFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path().join("db")).unwrap());
        let events = Arc::new(EventBus::new());
        let routes = Arc::new(RouteTable::new());
        let manager = Self::manager_for(&dir, &storage, &events, &routes);
        Self {
            dir,
            storage,
            events,
            routes,
            manager,
        }
    }

    /// A second manager over the same storage, standing in for a restart
    pub fn restarted_manager(&self) -> ModuleManager {
        Self::manager_for(&self.dir, &self.storage, &self.events, &self.routes)
    }

    pub fn data_root(&self) -> PathBuf {
        self.dir.path().join("plugins")
    }

    fn manager_for(
        dir: &TempDir,
        storage: &Arc<Storage>,
        events: &Arc<EventBus>,
        routes: &Arc<RouteTable>,
    ) -> ModuleManager {
        let core = Arc::new(CoreApiImpl::new(
            Arc::clone(storage),
            Arc::clone(events),
            Arc::new(CommandReloader::new(None)),
        ));
        let contexts = ContextFactory::new(
            dir.path().join("plugins"),
            Arc::clone(events),
            Arc::clone(storage.settings()),
            Arc::clone(routes),
            core,
        );
        ModuleManager::new(Arc::clone(storage), contexts)
    }

    pub async fn register(&self, module: SpyModule) {
        self.manager.register(Box::new(module)).await.unwrap();
    }
}
