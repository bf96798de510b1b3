//! Proxy Panel - plugin runtime for a reverse-proxy management panel
//!
//! The panel backend hosts independently developed modules. This crate
//! provides the runtime that registers them, orders them by dependency,
//! gives each one isolated resources and drives their lifecycle, plus the
//! storage and HTTP management surface around it.
//!
//! ## Layout
//!
//! 1. `storage`: embedded key/value persistence (redb or sled)
//! 2. `module`: registry, dependency resolution, lifecycle, module APIs
//! 3. `http`: management endpoints and plugin route dispatch
//! 4. `modules`: modules compiled into the panel
//! 5. `config`, `utils`: configuration, logging and process helpers

pub mod config;
pub mod http;
pub mod module;
pub mod modules;
pub mod storage;
pub mod utils;

pub use config::PanelConfig;
pub use module::{Module, ModuleContext, ModuleError, ModuleManager, ModuleMetadata};
