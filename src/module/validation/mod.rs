//! Module validation framework
//!
//! Checks module metadata before it enters the registry.

pub mod metadata_validator;

pub use metadata_validator::{MetadataValidator, ValidationResult};
