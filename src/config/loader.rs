//! Configuration file loader.

use std::path::PathBuf;

use crate::config::{ConfigError, SessionConfig};

/// Partial configuration as it appears in a TOML file.
///
/// Every field is optional so a file can set just the ones it cares about;
/// the CLI merges these over its own defaults and flags.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub python: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub server_script: Option<PathBuf>,
}

impl FileConfig {
    /// Merge this file config over `base`, file values taking precedence.
    #[must_use]
    pub fn merge_over(self, mut base: SessionConfig) -> SessionConfig {
        if let Some(host) = self.host {
            base.host = host;
        }
        if let Some(port) = self.port {
            base.port = port;
        }
        if let Some(python) = self.python {
            base.python = python;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            base.timeout_secs = timeout_secs;
        }
        if let Some(script) = self.server_script {
            base.server_script = Some(script);
        }
        base
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .pysock.toml
        search_paths.push(PathBuf::from(".pysock.toml"));

        // 2. User config directory: ~/.config/pysock/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("pysock").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return an empty
    /// partial config when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<FileConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(FileConfig::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<FileConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
