//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default companion host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default interpreter command, resolved on `PATH`.
pub const DEFAULT_PYTHON: &str = "python3";

/// Default socket read timeout (60 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_python() -> PathBuf {
    PathBuf::from(DEFAULT_PYTHON)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Configuration for a companion session.
///
/// Loaded from a TOML file, built from CLI flags, or constructed directly.
/// Validation happens in [`SessionConfig::validate`], which every session
/// constructor calls; a deserialized config is not trusted until it passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Network address of the companion process.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the companion listens on (1-65535).
    pub port: u16,
    /// Interpreter binary: an explicit path or a name resolved on `PATH`.
    #[serde(default = "default_python")]
    pub python: PathBuf,
    /// Socket read timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Companion server script; `None` means the bundled script.
    #[serde(default)]
    pub server_script: Option<PathBuf>,
}

impl SessionConfig {
    /// Create a configuration for `port` with all other fields defaulted.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            python: default_python(),
            timeout_secs: default_timeout_secs(),
            server_script: None,
        }
    }

    /// The socket read timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the configuration.
    ///
    /// Port 0 is rejected; ports below 1024 are accepted with a logged
    /// caution. The timeout must be at least one second. The interpreter
    /// must exist as a file or resolve on `PATH`, and an explicitly
    /// configured server script must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first failing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.port < 1024 {
            tracing::warn!(port = self.port, "Port is in the privileged range");
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if resolve_interpreter(&self.python).is_none() {
            return Err(ConfigError::InterpreterNotFound {
                python: self.python.clone(),
            });
        }
        if let Some(script) = &self.server_script {
            if !script.is_file() {
                return Err(ConfigError::ScriptNotFound {
                    path: script.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Resolve the interpreter to an absolute or caller-relative path.
///
/// A value containing a path separator is checked as a file; a bare name is
/// searched for in every `PATH` entry. Returns `None` if nothing matches.
#[must_use]
pub fn resolve_interpreter(python: &Path) -> Option<PathBuf> {
    if python.components().count() > 1 {
        return python.is_file().then(|| python.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(python))
        .find(|candidate| candidate.is_file())
}

/// Errors in session configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Port 0 is not a usable listening port.
    #[error("Port must be between 1 and 65535")]
    InvalidPort,

    /// No port was supplied by flags or config file.
    #[error("No port configured (pass --port or set one in the config file)")]
    MissingPort,

    /// A zero timeout would be rejected by the socket layer.
    #[error("Timeout must be at least 1 second")]
    InvalidTimeout,

    /// The interpreter is neither an existing file nor on `PATH`.
    #[error("Python interpreter not found: {python}")]
    InterpreterNotFound { python: PathBuf },

    /// An explicitly configured server script does not exist.
    #[error("Server script not found: {path}")]
    ScriptNotFound { path: PathBuf },

    /// A config field was mutated while the session was running.
    #[error("Cannot change {field} while the session is running")]
    LockedWhileRunning { field: &'static str },

    /// Failed to read a config file.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse a config file.
    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
