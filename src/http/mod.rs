//! HTTP management surface
//!
//! Serves the module management endpoints and dispatches requests to the
//! routes modules mounted in the shared [`RouteTable`](crate::module::api::RouteTable).

pub mod auth;
pub mod server;

pub use auth::{ApiAuth, AuthDecision};
pub use server::{PanelApp, PanelServer};
