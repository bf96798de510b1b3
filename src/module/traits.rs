//! Module system traits and interfaces
//!
//! Defines the contract every compiled-in module implements and the
//! capability surface the panel exposes back to modules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::api::context::ModuleContext;
use crate::storage::ReadOnlyStorage;

/// Module lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ModuleState {
    /// Registered, no orchestration pass has touched it yet
    Registered,
    /// Skipped by the last pass because the operator disabled it
    Disabled,
    /// Init succeeded
    Initialized,
    /// Start succeeded
    Running,
    /// Stop succeeded
    Stopped,
    /// A lifecycle call failed
    Failed(String),
}

/// Module metadata describing module identity and ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Unique identifier; also names the module's data directory and config prefix
    pub id: String,
    /// Display name
    pub name: String,
    /// Module version (semantic versioning)
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// IDs of modules that must be initialized before this one
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Lower loads earlier; only breaks ties between ready modules
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ModuleMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            dependencies: Vec::new(),
            priority: 0,
            icon: None,
            category: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// One navigable page contributed by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendRoute {
    pub path: String,
    /// Component reference resolved by the UI bundle
    pub component: String,
    pub show_in_menu: bool,
    #[serde(default)]
    pub icon: String,
    pub label: String,
    /// Localized label keyed by locale, e.g. `zh-CN`
    #[serde(default)]
    pub label_i18n: std::collections::BTreeMap<String, String>,
}

/// Navigation contributed by a module to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendManifest {
    pub id: String,
    pub routes: Vec<FrontendRoute>,
    pub menu_group: String,
    pub menu_order: i32,
}

/// Optional capability: modules that contribute UI pages
pub trait FrontendProvider: Send + Sync {
    fn frontend_manifest(&self) -> FrontendManifest;
}

/// Module trait that all modules must implement
///
/// Modules are trusted, compiled-in components. The manager calls
/// `init` -> `start` in load order and `stop` in reverse load order.
#[async_trait]
pub trait Module: Send + Sync {
    /// Get module metadata
    ///
    /// Read once at registration; later changes are never observed.
    fn metadata(&self) -> ModuleMetadata;

    /// Initialize the module with its isolated resources
    ///
    /// The data directory already exists when this is called.
    async fn init(&mut self, context: ModuleContext) -> Result<(), ModuleError>;

    /// Start the module
    ///
    /// Background work spawned here must be cancellable by `stop`.
    async fn start(&mut self) -> Result<(), ModuleError>;

    /// Stop the module
    ///
    /// Must signal and await any background work started in `start`.
    async fn stop(&mut self) -> Result<(), ModuleError>;

    /// Frontend capability, if this module contributes UI pages
    fn frontend_provider(&self) -> Option<&dyn FrontendProvider> {
        None
    }
}

/// Request to create a reverse-proxy entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProxyHost {
    pub domain: String,
    pub upstream: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub force_https: bool,
    #[serde(default)]
    pub websocket: bool,
}

/// Core API trait - the host operations modules may call
///
/// Implemented by the panel, handed to every module through its context.
#[async_trait]
pub trait CoreApi: Send + Sync {
    /// Create a reverse-proxy entry, returning its id
    async fn create_proxy_host(&self, request: NewProxyHost) -> Result<u64, ModuleError>;

    /// Delete a reverse-proxy entry
    async fn delete_proxy_host(&self, id: u64) -> Result<(), ModuleError>;

    /// Regenerate and reload the proxy configuration
    async fn reload_proxy(&self) -> Result<(), ModuleError>;

    /// Read a single shared setting
    async fn get_setting(&self, key: &str) -> Result<Option<String>, ModuleError>;

    /// Write a single shared setting
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), ModuleError>;

    /// Read-only handle to the shared persistence layer
    fn storage(&self) -> ReadOnlyStorage;
}

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module ID cannot be empty")]
    EmptyModuleId,

    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    #[error("Invalid module metadata: {0}")]
    InvalidMetadata(String),

    #[error("Module {module} depends on unregistered module {dependency}")]
    DependencyMissing { module: String, dependency: String },

    #[error("Circular dependency detected among modules: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    #[error("Module {id} v{version} failed to initialize: {source}")]
    InitFailed {
        id: String,
        version: String,
        #[source]
        source: Box<ModuleError>,
    },

    #[error("Module {id} failed to start: {source}")]
    StartFailed {
        id: String,
        #[source]
        source: Box<ModuleError>,
    },

    #[error("Module {id} failed to stop: {source}")]
    StopFailed {
        id: String,
        #[source]
        source: Box<ModuleError>,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Module operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::Storage(e.to_string())
    }
}
