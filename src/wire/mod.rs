//! Line-oriented wire protocol between the session and the companion process.
//!
//! # Protocol
//!
//! ```text
//! Client                         Companion
//!   |                               |
//!   |-- code lines + half-close --->|
//!   |                               | (execute, capture stdout)
//!   |<-- printed output, close -----|
//!   |                               |
//! ```
//!
//! Requests and replies are UTF-8 text. The client writes one or more
//! newline-terminated lines of code and shuts down its write side so the
//! companion observes end-of-request; the companion writes back whatever the
//! code printed and closes the connection. A reply whose first line equals
//! [`ERROR_MARKER`] carries a remote error, with the remaining lines holding
//! the companion-side traceback.
//!
//! Every exchange uses a fresh connection ([`round_trip`]); nothing is
//! pooled or retried at this layer.

pub mod request;
pub mod response;
pub mod transport;

pub use request::{exec_request, get_request, set_request, validate_identifier};
pub use response::{decode_value, parse_reply};
pub use transport::{round_trip, Connection};

/// First line of a reply that carries a companion-side error.
pub const ERROR_MARKER: &str = "pysock-error";

/// Request that asks the companion to shut down.
pub const QUIT_REQUEST: &str = "quit";

/// Exact acknowledgement the companion sends for a clean shutdown.
pub const QUIT_ACK: &str = "QUIT";

/// Liveness probe request; expected to print at least one line.
pub const PROBE_REQUEST: &str = "print(\"RUNNING\")";

/// Errors that can occur on the wire.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Failed to connect to the companion process.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Read or write failed after the connection was established.
    #[error("Socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// No reply arrived within the read timeout.
    #[error("No reply within {0}ms")]
    Timeout(u64),

    /// The companion reported an error while executing the request.
    #[error("Remote execution failed:\n{0}")]
    Remote(String),

    /// A reply that should carry a JSON value could not be parsed.
    #[error("Failed to decode reply as JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The reply was empty where output was required.
    #[error("Empty reply from companion")]
    EmptyReply,

    /// A variable name was not a valid Python identifier.
    #[error("Invalid variable name: {0:?}")]
    InvalidIdentifier(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_detail() {
        let err = WireError::Remote("Traceback\nNameError: name 'x'".to_string());
        assert!(err.to_string().contains("NameError"));
    }

    #[test]
    fn invalid_identifier_display() {
        let err = WireError::InvalidIdentifier("1bad".to_string());
        assert_eq!(err.to_string(), "Invalid variable name: \"1bad\"");
    }

    #[test]
    fn timeout_display() {
        let err = WireError::Timeout(60_000);
        assert_eq!(err.to_string(), "No reply within 60000ms");
    }
}
