//! Session configuration.

pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, FileConfig};
pub use types::{
    resolve_interpreter, ConfigError, SessionConfig, DEFAULT_HOST, DEFAULT_PYTHON, DEFAULT_TIMEOUT,
};
