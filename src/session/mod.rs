//! The session façade.
//!
//! A [`Session`] owns the full contract: configuration, run state, the
//! companion process, and the four data operations (`exec`, `get`, `set`,
//! `stop`). Every remote call opens and closes its own connection rather
//! than holding one open; each call gets a fresh chance to detect a dead
//! companion, and a companion-side crash can never corrupt a pooled socket.
//!
//! Sessions are synchronous and single-caller: data operations take
//! `&mut self`, so exclusive access is enforced by the borrow checker.
//! Callers should stop the companion explicitly with [`Session::stop`] or
//! [`Session::kill`]; the `Drop` impl force-kills a still-running companion
//! as a safety net only.
//!
//! # Example
//!
//! ```no_run
//! use pysock::config::SessionConfig;
//! use pysock::session::Session;
//!
//! # fn example() -> Result<(), pysock::session::SessionError> {
//! let mut session = Session::new(SessionConfig::new(9000))?;
//! session.start()?;
//!
//! session.set([("x", &serde_json::json!([1, 2, 3]))])?;
//! session.exec("y = sum(x)")?;
//! assert_eq!(session.get("y")?, serde_json::json!(6));
//!
//! session.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::SessionError;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::{ConfigError, SessionConfig};
use crate::process::{probe_alive, CompanionProcess, ServerScript};
use crate::wire::{self, WireError, QUIT_ACK, QUIT_REQUEST};

/// Best-effort request for the companion's interpreter version.
const VERSION_REQUEST: &str = "print(__import__(\"sys\").version.split()[0])";

/// How long to wait for the companion to exit after a confirmed shutdown.
const REAP_DEADLINE: Duration = Duration::from_secs(2);

/// Pause between liveness probe attempts while the companion starts up.
const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Run state of a session.
///
/// `Running` owns the process handle, so a running session structurally
/// cannot lack a pid.
#[derive(Debug)]
enum RunState {
    NotRunning,
    Running {
        process: CompanionProcess,
        version: Option<String>,
    },
}

/// A session with a companion Python interpreter.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: RunState,
}

impl Session {
    /// Create a session from a validated configuration.
    ///
    /// No process is spawned and no connection is opened until
    /// [`Session::start`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the port is 0, the interpreter cannot be
    /// resolved, or a configured server script does not exist.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: RunState::NotRunning,
        })
    }

    /// The configured companion host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// The configured companion port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The configured interpreter.
    #[must_use]
    pub fn python(&self) -> &Path {
        &self.config.python
    }

    /// The socket read timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Whether the companion is considered running.
    ///
    /// This reflects the last confirmed observation, not a live check: a
    /// companion that died since the last operation still reports `true`
    /// until the next operation fails to connect.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    /// The companion's OS process id, if running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            RunState::Running { process, .. } => Some(process.id()),
            RunState::NotRunning => None,
        }
    }

    /// The companion's interpreter version, if it could be fetched at start.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match &self.state {
            RunState::Running { version, .. } => version.as_deref(),
            RunState::NotRunning => None,
        }
    }

    fn ensure_not_running(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::LockedWhileRunning { field });
        }
        Ok(())
    }

    /// Change the companion host.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LockedWhileRunning`] while the session runs.
    pub fn set_host(&mut self, host: impl Into<String>) -> Result<(), ConfigError> {
        self.ensure_not_running("host")?;
        self.config.host = host.into();
        Ok(())
    }

    /// Change the companion port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LockedWhileRunning`] while the session runs,
    /// or [`ConfigError::InvalidPort`] for port 0.
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        self.ensure_not_running("port")?;
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if port < 1024 {
            tracing::warn!(port, "Port is in the privileged range");
        }
        self.config.port = port;
        Ok(())
    }

    /// Change the interpreter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LockedWhileRunning`] while the session runs,
    /// or [`ConfigError::InterpreterNotFound`] if the new value neither
    /// exists as a file nor resolves on `PATH`.
    pub fn set_python(&mut self, python: impl Into<PathBuf>) -> Result<(), ConfigError> {
        self.ensure_not_running("python")?;
        let python = python.into();
        if crate::config::resolve_interpreter(&python).is_none() {
            return Err(ConfigError::InterpreterNotFound { python });
        }
        self.config.python = python;
        Ok(())
    }

    /// Change the server script.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LockedWhileRunning`] while the session runs,
    /// or [`ConfigError::ScriptNotFound`] if the script does not exist.
    pub fn set_server_script(&mut self, script: impl Into<PathBuf>) -> Result<(), ConfigError> {
        self.ensure_not_running("server_script")?;
        let script = script.into();
        if !script.is_file() {
            return Err(ConfigError::ScriptNotFound { path: script });
        }
        self.config.server_script = Some(script);
        Ok(())
    }

    /// Change the socket read timeout.
    ///
    /// Allowed in any state; affects only connections opened afterwards.
    /// The timeout is stored in whole seconds, rounded up, with a minimum
    /// of one second: a zero or sub-second value would be rejected by the
    /// socket layer and leave the session unable to connect at all.
    pub fn set_timeout(&mut self, timeout: Duration) {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.config.timeout_secs = secs.max(1);
    }

    /// Start the companion process and confirm it is reachable.
    ///
    /// Stages the bundled server script unless one is configured, spawns
    /// the interpreter, and probes the socket until the companion answers
    /// or the timeout elapses. The session becomes running only after the
    /// probe confirms output; on failure the spawned process is killed and
    /// reaped. Calling `start` on a running session is an informational
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration no longer validates,
    /// [`crate::process::LaunchError`] if the interpreter cannot be spawned
    /// or exits during startup, or [`WireError`] if the companion never
    /// answers the probe.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.is_running() {
            tracing::info!(port = self.config.port, "Session already running");
            return Ok(());
        }

        // Paths may have changed on disk since construction.
        self.config.validate()?;

        let script = match &self.config.server_script {
            Some(path) => ServerScript::External(path.clone()),
            None => ServerScript::stage_bundled()?,
        };

        let mut process = CompanionProcess::launch(
            &self.config.python,
            script,
            self.config.port,
            &self.config.host,
        )?;

        if let Err(e) = self.wait_until_alive(&mut process) {
            tracing::warn!(error = %e, "Companion never became reachable, killing it");
            if let Err(kill_err) = process.force_kill() {
                tracing::warn!(error = %kill_err, "Failed to kill unreachable companion");
            }
            process.reap(REAP_DEADLINE);
            return Err(e);
        }

        let version = self.fetch_version();
        tracing::info!(
            pid = process.id(),
            port = self.config.port,
            version = version.as_deref().unwrap_or("unknown"),
            "Session running"
        );
        self.state = RunState::Running { process, version };
        Ok(())
    }

    /// Probe until the companion answers or the timeout elapses.
    ///
    /// Fails fast if the child exits before becoming reachable.
    fn wait_until_alive(&self, process: &mut CompanionProcess) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.config.timeout();
        loop {
            if let Ok(Some(status)) = process.try_wait() {
                return Err(crate::process::LaunchError::ExitedDuringStartup { status }.into());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.config.timeout().as_millis() as u64;
                return Err(WireError::Timeout(timeout_ms).into());
            }

            match probe_alive(&self.config.host, self.config.port, remaining) {
                Ok(()) => return Ok(()),
                Err(WireError::Connect { .. }) => std::thread::sleep(PROBE_INTERVAL),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Best-effort fetch of the companion's interpreter version.
    fn fetch_version(&self) -> Option<String> {
        let reply = wire::round_trip(
            &self.config.host,
            self.config.port,
            self.config.timeout(),
            VERSION_REQUEST,
        );
        match reply.map(wire::parse_reply) {
            Ok(Ok(lines)) => lines.into_iter().next(),
            Ok(Err(e)) | Err(e) => {
                tracing::debug!(error = %e, "Could not fetch companion version");
                None
            }
        }
    }

    fn require_running(&self) -> Result<(), SessionError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SessionError::NotRunning)
        }
    }

    fn round_trip(&self, request: &str) -> Result<Vec<String>, WireError> {
        wire::round_trip(
            &self.config.host,
            self.config.port,
            self.config.timeout(),
            request,
        )
    }

    /// Execute a block of code in the companion and return what it printed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotRunning`] while stopped, a remote error
    /// if the code raised, or a wire error if the round-trip failed.
    pub fn exec(&mut self, code: &str) -> Result<Vec<String>, SessionError> {
        self.require_running()?;
        let reply = self.round_trip(code)?;
        Ok(wire::parse_reply(reply)?)
    }

    /// Execute a batch of statements as one block.
    ///
    /// # Errors
    ///
    /// Same as [`Session::exec`].
    pub fn exec_lines(&mut self, statements: &[String]) -> Result<Vec<String>, SessionError> {
        self.exec(&wire::exec_request(statements))
    }

    /// Execute the contents of a file as one block.
    ///
    /// The file is read locally and its text submitted verbatim; the path
    /// itself is never sent to the companion.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ReadScript`] if the file cannot be read, and
    /// otherwise the same errors as [`Session::exec`].
    pub fn exec_file(&mut self, path: &Path) -> Result<Vec<String>, SessionError> {
        self.require_running()?;
        let code = std::fs::read_to_string(path).map_err(|source| SessionError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;
        self.exec(&code)
    }

    /// Fetch a variable from the companion's namespace as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotRunning`] while stopped, a naming error
    /// for an invalid identifier (sent before any bytes go out), a remote
    /// error if the companion failed to serialize, or a decode error if the
    /// reply is not valid JSON.
    pub fn get(&mut self, name: &str) -> Result<Value, SessionError> {
        self.require_running()?;
        let request = wire::get_request(name)?;
        let reply = self.round_trip(&request)?;
        Ok(wire::decode_value(reply)?)
    }

    /// Merge variables into the companion's namespace.
    ///
    /// All names are validated before any connection is opened; one bad
    /// name fails the whole call with no bytes sent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotRunning`] while stopped, a naming error
    /// for an invalid identifier, or a remote error if the merge failed.
    pub fn set<'a, I>(&mut self, variables: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.require_running()?;
        let request = wire::set_request(variables)?;
        let reply = self.round_trip(&request)?;
        wire::parse_reply(reply)?;
        Ok(())
    }

    /// Ask the companion to shut down gracefully.
    ///
    /// The session transitions to not-running only on the exact `QUIT`
    /// acknowledgement; on any other reply it stays running so the caller
    /// can retry or escalate to [`Session::kill`]. Calling `stop` on a
    /// stopped session is an informational no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UncleanShutdown`] for a stray
    /// acknowledgement, or a wire error if the companion is unreachable.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        if !self.is_running() {
            tracing::info!("Session already stopped");
            return Ok(());
        }

        let reply = self.round_trip(QUIT_REQUEST)?;
        let ack = reply.join("\n");
        if ack != QUIT_ACK {
            tracing::warn!(ack = %ack, "Unclean shutdown acknowledgement");
            return Err(SessionError::UncleanShutdown { ack });
        }

        if let RunState::Running { mut process, .. } =
            std::mem::replace(&mut self.state, RunState::NotRunning)
        {
            process.reap(REAP_DEADLINE);
        }
        tracing::info!("Session stopped");
        Ok(())
    }

    /// Terminate the companion process at the OS level.
    ///
    /// Best-effort: a failed signal is logged, not surfaced, and the
    /// session transitions to not-running unconditionally. Calling `kill`
    /// on a stopped session is an informational no-op.
    pub fn kill(&mut self) {
        let RunState::Running { mut process, .. } =
            std::mem::replace(&mut self.state, RunState::NotRunning)
        else {
            tracing::info!("Session already stopped");
            return;
        };

        if let Err(e) = process.force_kill() {
            tracing::warn!(pid = process.id(), error = %e, "Failed to kill companion");
        }
        process.reap(REAP_DEADLINE);
        tracing::info!("Session killed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Safety net: callers are expected to stop or kill explicitly.
        if self.is_running() {
            tracing::warn!("Session dropped while running, killing companion");
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_config(port: u16) -> SessionConfig {
        SessionConfig {
            // The current executable stands in for an interpreter file.
            python: std::env::current_exe().unwrap(),
            ..SessionConfig::new(port)
        }
    }

    #[test]
    fn new_rejects_port_zero() {
        let result = Session::new(valid_config(0));
        assert!(matches!(result, Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn new_rejects_missing_interpreter() {
        let config = SessionConfig {
            python: PathBuf::from("/nonexistent/python3"),
            ..SessionConfig::new(9000)
        };
        assert!(matches!(
            Session::new(config),
            Err(ConfigError::InterpreterNotFound { .. })
        ));
    }

    #[test]
    fn new_session_is_not_running() {
        let session = Session::new(valid_config(9000)).unwrap();
        assert!(!session.is_running());
        assert!(session.pid().is_none());
        assert!(session.version().is_none());
    }

    #[test]
    fn data_operations_require_running() {
        let mut session = Session::new(valid_config(9000)).unwrap();

        assert!(matches!(session.exec("x = 1"), Err(SessionError::NotRunning)));
        assert!(matches!(session.get("x"), Err(SessionError::NotRunning)));
        let value = json!(1);
        assert!(matches!(
            session.set([("x", &value)]),
            Err(SessionError::NotRunning)
        ));
        assert!(matches!(
            session.exec_file(Path::new("/tmp/whatever.py")),
            Err(SessionError::NotRunning)
        ));
    }

    #[test]
    fn stop_and_kill_are_noops_when_not_running() {
        let mut session = Session::new(valid_config(9000)).unwrap();
        assert!(session.stop().is_ok());
        session.kill();
        assert!(!session.is_running());
    }

    #[test]
    fn config_mutators_work_while_stopped() {
        let mut session = Session::new(valid_config(9000)).unwrap();

        session.set_host("127.0.0.1").unwrap();
        assert_eq!(session.host(), "127.0.0.1");

        session.set_port(9001).unwrap();
        assert_eq!(session.port(), 9001);

        session.set_timeout(Duration::from_secs(5));
        assert_eq!(session.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn set_timeout_rounds_up_to_whole_seconds() {
        let mut session = Session::new(valid_config(9000)).unwrap();

        // A zero or sub-second timeout would be rejected by the socket
        // layer, so it is rounded up instead of stored as 0.
        session.set_timeout(Duration::from_millis(500));
        assert_eq!(session.timeout(), Duration::from_secs(1));

        session.set_timeout(Duration::ZERO);
        assert_eq!(session.timeout(), Duration::from_secs(1));

        session.set_timeout(Duration::from_millis(1500));
        assert_eq!(session.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn set_port_rejects_zero() {
        let mut session = Session::new(valid_config(9000)).unwrap();
        assert!(matches!(
            session.set_port(0),
            Err(ConfigError::InvalidPort)
        ));
    }

    #[test]
    fn set_python_rejects_missing_path() {
        let mut session = Session::new(valid_config(9000)).unwrap();
        assert!(matches!(
            session.set_python("/nonexistent/python3"),
            Err(ConfigError::InterpreterNotFound { .. })
        ));
    }

    #[test]
    fn set_server_script_rejects_missing_file() {
        let mut session = Session::new(valid_config(9000)).unwrap();
        assert!(matches!(
            session.set_server_script("/nonexistent/server.py"),
            Err(ConfigError::ScriptNotFound { .. })
        ));
    }
}
