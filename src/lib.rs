//! pysock - drive a companion Python interpreter over a local TCP socket.
//!
//! A [`session::Session`] launches the interpreter as a child process,
//! confirms it is reachable, and then exchanges code and JSON values with
//! it over one fresh connection per call until it is stopped.

pub mod config;
pub mod process;
pub mod session;
pub mod wire;

pub use config::SessionConfig;
pub use session::{Session, SessionError};
