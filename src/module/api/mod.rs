//! Module-facing APIs
//!
//! Event bus, config store, scoped routing, the per-module context and the
//! core capability surface.

pub mod config_store;
pub mod context;
pub mod core_api;
pub mod events;
pub mod router;

pub use config_store::ConfigStore;
pub use context::{ContextFactory, ModuleContext, ModuleLogger};
pub use core_api::{CommandReloader, CoreApiImpl, ProxyReloader, CORE_SOURCE};
pub use events::{Event, EventBus, EventHandler, WILDCARD};
pub use router::{ModuleRouter, RouteAccess, RouteRequest, RouteResponse, RouteTable};
