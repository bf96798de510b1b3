//! Modules compiled into the panel binary

pub mod audit;

pub use audit::{AuditModule, AUDIT_MODULE_ID};
