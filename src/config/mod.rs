//! Configuration management for proxy-panel
//!
//! Handles configuration loading (JSON or TOML) and validation. Every section
//! has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::storage::database::DatabaseBackend;

/// Module system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Register the built-in modules at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root under which each module gets `<data_dir>/<id>`
    #[serde(default = "default_modules_data_dir")]
    pub data_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_modules_data_dir() -> PathBuf {
    PathBuf::from("data/plugins")
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: default_modules_data_dir(),
        }
    }
}

/// Database backend configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackendConfig {
    Sled,
    Redb,
    /// Default backend, falling back to the other one on failure
    Auto,
}

impl DatabaseBackendConfig {
    /// Concrete backend, or `None` for automatic selection
    pub fn backend(self) -> Option<DatabaseBackend> {
        match self {
            DatabaseBackendConfig::Sled => Some(DatabaseBackend::Sled),
            DatabaseBackendConfig::Redb => Some(DatabaseBackend::Redb),
            DatabaseBackendConfig::Auto => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    #[serde(default = "default_database_backend")]
    pub backend: DatabaseBackendConfig,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/db")
}

fn default_database_backend() -> DatabaseBackendConfig {
    DatabaseBackendConfig::Auto
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            backend: DatabaseBackendConfig::Auto,
        }
    }
}

/// HTTP management server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Bearer token for management and authenticated plugin routes.
    /// When unset, those routes are open.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8081".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            api_token: None,
        }
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {:?}: {}", self.listen_addr, e))
    }
}

/// Reverse-proxy supervisor integration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Program and arguments run on reload, e.g. `["nginx", "-s", "reload"]`
    #[serde(default)]
    pub reload_command: Option<Vec<String>>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directives; `RUST_LOG` takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON records (needs the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Top-level panel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub modules: ModuleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PanelConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PanelConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PanelConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load by extension: `.json` is JSON, anything else is TOML
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_file(path)?
        } else {
            Self::from_toml_file(path)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.modules.data_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("modules.data_dir must not be empty"));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("storage.path must not be empty"));
        }
        self.http.socket_addr()?;

        if let Some(token) = &self.http.api_token {
            if token.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "http.api_token must not be blank; remove it to disable authentication"
                ));
            }
        }
        if let Some(command) = &self.proxy.reload_command {
            if command.first().is_some_and(|program| program.trim().is_empty()) {
                return Err(anyhow::anyhow!("proxy.reload_command program must not be empty"));
            }
        }
        Ok(())
    }
}
