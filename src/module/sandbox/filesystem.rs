//! Data directory confinement
//!
//! Resolves module-relative paths against the module's exclusive data
//! directory and refuses anything that would escape it.

use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::module::traits::ModuleError;

/// Maps relative paths into one module's data directory
#[derive(Debug, Clone)]
pub struct FileSystemSandbox {
    allowed_path: PathBuf,
}

impl FileSystemSandbox {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            allowed_path: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Join a relative path onto the data directory
    ///
    /// Absolute paths and `..` components are rejected lexically, so the
    /// target does not need to exist yet.
    pub fn validate_path<P: AsRef<Path>>(&self, relative: P) -> Result<PathBuf, ModuleError> {
        let relative = relative.as_ref();

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    warn!(
                        "Rejected path {:?} outside data directory {:?}",
                        relative, self.allowed_path
                    );
                    return Err(ModuleError::OperationError(format!(
                        "Access denied: path {:?} escapes data directory {:?}",
                        relative, self.allowed_path
                    )));
                }
            }
        }

        Ok(self.allowed_path.join(relative))
    }

    pub fn allowed_path(&self) -> &Path {
        &self.allowed_path
    }

    /// Whether an already-resolved path lies under the data directory
    ///
    /// Existing paths are canonicalized so symlinks pointing elsewhere are caught.
    pub fn is_within_sandbox<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        if !path.starts_with(&self.allowed_path) {
            return false;
        }
        match (path.canonicalize(), self.allowed_path.canonicalize()) {
            (Ok(real), Ok(root)) => real.starts_with(root),
            _ => true,
        }
    }
}
