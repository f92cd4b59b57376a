//! Session error types.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::process::LaunchError;
use crate::wire::WireError;

/// Errors that can occur during session operations.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// A data operation was attempted while the companion is not running.
    #[error("Session is not running")]
    NotRunning,

    /// Graceful shutdown was not acknowledged with the expected token.
    ///
    /// The session stays running: the companion may still be alive, so the
    /// caller can retry `stop` or escalate to `kill`.
    #[error("Companion did not acknowledge shutdown (got {ack:?})")]
    UncleanShutdown { ack: String },

    /// A file submitted for execution could not be read.
    #[error("Failed to read script {path}: {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration was invalid or mutated while running.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The companion process could not be launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A wire exchange failed.
    #[error(transparent)]
    Wire(#[from] WireError),
}
