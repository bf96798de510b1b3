//! Metadata validation
//!
//! Validates module metadata for structure before registration. Module IDs
//! double as directory names and config-store prefixes, so their alphabet is
//! restricted.

use tracing::{debug, warn};

use crate::module::traits::ModuleMetadata;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Metadata is valid
    Valid,
    /// Metadata is invalid with specific errors
    Invalid(Vec<String>),
}

/// Metadata validator
pub struct MetadataValidator {
    max_id_len: usize,
}

impl MetadataValidator {
    pub fn new() -> Self {
        Self { max_id_len: 64 }
    }

    /// Validate module metadata
    pub fn validate(&self, metadata: &ModuleMetadata) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_id(&metadata.id) {
            errors.push(format!(
                "Invalid module id: {:?} (must be alphanumeric with dashes/underscores, at most {} chars)",
                metadata.id, self.max_id_len
            ));
        }

        if metadata.name.trim().is_empty() {
            errors.push("Module name cannot be empty".to_string());
        }

        if metadata.version.is_empty() {
            errors.push("Module version cannot be empty".to_string());
        } else if !self.is_valid_version(&metadata.version) {
            errors.push(format!(
                "Invalid version format: {} (expected semantic versioning)",
                metadata.version
            ));
        }

        for dep in &metadata.dependencies {
            if dep == &metadata.id {
                errors.push(format!("Module {} cannot depend on itself", metadata.id));
            } else if !self.is_valid_id(dep) {
                errors.push(format!("Invalid dependency id: {:?}", dep));
            }
        }

        if errors.is_empty() {
            debug!("Metadata validation passed for module: {}", metadata.id);
            ValidationResult::Valid
        } else {
            warn!(
                "Metadata validation failed for module {}: {:?}",
                metadata.id, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    #[inline]
    fn is_valid_id(&self, id: &str) -> bool {
        if id.is_empty() || id.len() > self.max_id_len {
            return false;
        }

        if !id.chars().next().map_or(false, |c| c.is_ascii_alphanumeric()) {
            return false;
        }

        id.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Accepts: major.minor[.patch][-prerelease][+build]
    #[inline]
    fn is_valid_version(&self, version: &str) -> bool {
        let base = version.split('+').next().unwrap_or_default();
        let core = base.split('-').next().unwrap_or_default();

        let nums: Vec<&str> = core.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return false;
        }

        nums.iter()
            .all(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n.parse::<u32>().is_ok())
    }
}

impl Default for MetadataValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_metadata() {
        let validator = MetadataValidator::new();
        let meta = ModuleMetadata::new("ai-assistant", "AI Assistant", "0.3.1-beta+42")
            .with_dependency("docker_mgr");
        assert_eq!(validator.validate(&meta), ValidationResult::Valid);
    }

    #[test]
    fn test_path_unsafe_id_rejected() {
        let validator = MetadataValidator::new();
        for id in ["../etc", "a.b", "-leading", "with space", ""] {
            let meta = ModuleMetadata::new(id, "X", "1.0.0");
            assert!(
                matches!(validator.validate(&meta), ValidationResult::Invalid(_)),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_bad_version_and_self_dependency() {
        let validator = MetadataValidator::new();
        let meta = ModuleMetadata::new("deploy", "Deploy", "v1").with_dependency("deploy");
        match validator.validate(&meta) {
            ValidationResult::Invalid(errors) => assert_eq!(errors.len(), 2),
            ValidationResult::Valid => panic!("expected invalid metadata"),
        }
    }
}
