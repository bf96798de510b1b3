//! Module system for proxy-panel
//!
//! Hosts trusted, compiled-in modules (container management, deployment,
//! file access and similar panel features) with declared dependencies,
//! isolated resources and lifecycle guarantees.
//!
//! ## Architecture
//!
//! - **Registry**: one instance per module ID, metadata cached at registration
//! - **Load order**: dependencies first, ties broken by priority then ID
//! - **Isolation**: each module gets its own data directory, config namespace and route prefix
//! - **Messaging**: modules talk through the event bus and the core API only
//! - **Enablement**: persisted per module, applied on the next start

pub mod api;
pub mod manager;
pub mod registry;
pub mod sandbox;
pub mod traits;
pub mod validation;

pub use api::{ContextFactory, Event, EventBus, ModuleContext};
pub use manager::{ModuleInfo, ModuleManager};
pub use registry::ModuleRegistry;
pub use traits::{
    CoreApi, FrontendManifest, FrontendProvider, FrontendRoute, Module, ModuleError,
    ModuleMetadata, ModuleState, NewProxyHost,
};
