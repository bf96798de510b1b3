//! Module registry and dependency resolution
//!
//! Holds every registered module instance together with the metadata cached at
//! registration time.

pub mod dependencies;

pub use dependencies::{DependencyResolution, ModuleDependencies};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::module::traits::{FrontendManifest, Module, ModuleError, ModuleMetadata};
use crate::module::validation::{MetadataValidator, ValidationResult};

/// Shared handle to a module instance
///
/// Each module sits behind its own lock so lifecycle calls never hold the
/// registry lock.
pub type ModuleHandle = Arc<Mutex<Box<dyn Module>>>;

/// A registered module
pub struct RegisteredModule {
    pub metadata: ModuleMetadata,
    /// Frontend manifest captured at registration, if the module provides one
    pub frontend: Option<FrontendManifest>,
    pub instance: ModuleHandle,
}

/// Registry of all known modules, keyed by module ID
pub struct ModuleRegistry {
    modules: HashMap<String, RegisteredModule>,
    validator: MetadataValidator,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            validator: MetadataValidator::new(),
        }
    }

    /// Register a module
    ///
    /// Rejects empty, invalid or duplicate IDs without touching existing entries.
    pub fn register(&mut self, module: Box<dyn Module>) -> Result<ModuleMetadata, ModuleError> {
        let metadata = module.metadata();

        if metadata.id.is_empty() {
            return Err(ModuleError::EmptyModuleId);
        }
        if self.modules.contains_key(&metadata.id) {
            return Err(ModuleError::DuplicateModule(metadata.id));
        }
        if let ValidationResult::Invalid(errors) = self.validator.validate(&metadata) {
            return Err(ModuleError::InvalidMetadata(errors.join("; ")));
        }

        let frontend = module.frontend_provider().map(|p| p.frontend_manifest());

        debug!("Registered module {} v{}", metadata.id, metadata.version);
        self.modules.insert(
            metadata.id.clone(),
            RegisteredModule {
                metadata: metadata.clone(),
                frontend,
                instance: Arc::new(Mutex::new(module)),
            },
        );
        Ok(metadata)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredModule> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Metadata of all modules, sorted by ID
    pub fn metadata(&self) -> Vec<&ModuleMetadata> {
        let mut all: Vec<&ModuleMetadata> = self.modules.values().map(|m| &m.metadata).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Compute the load order for the current set of modules
    pub fn resolve(&self) -> Result<DependencyResolution, ModuleError> {
        ModuleDependencies::resolve(self.modules.values().map(|m| &m.metadata))
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
