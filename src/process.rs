//! Companion process spawning and control.
//!
//! The supervisor manages the interpreter's existence independent of the
//! session above it: spawn, liveness probe, and forced termination. It never
//! waits on the process except through [`CompanionProcess::try_wait`] and
//! the bounded [`CompanionProcess::reap`].

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::wire::{self, WireError, PROBE_REQUEST};

/// The companion server script shipped inside the crate.
pub const BUNDLED_SERVER: &str = include_str!("../py/server.py");

/// Error type for launching the companion process.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// The interpreter binary was not found.
    #[error("Interpreter not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when spawning.
    #[error("Permission denied spawning {0}")]
    PermissionDenied(PathBuf),

    /// Other I/O error while spawning.
    #[error("Failed to spawn interpreter: {0}")]
    Io(#[source] std::io::Error),

    /// The bundled server script could not be staged to disk.
    #[error("Failed to stage server script: {0}")]
    StageScript(#[source] std::io::Error),

    /// The companion exited before it became reachable.
    #[error("Companion exited during startup with {status}")]
    ExitedDuringStartup { status: ExitStatus },
}

impl LaunchError {
    fn from_io(err: std::io::Error, python: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(python.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(python.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Where the server script running a companion came from.
///
/// A staged script lives in a temp directory owned by this value, so the
/// file outlives the companion that reads it.
#[derive(Debug)]
pub enum ServerScript {
    /// Caller-supplied path on disk.
    External(PathBuf),
    /// Bundled script written to a temp directory owned by this variant.
    Staged {
        _dir: tempfile::TempDir,
        path: PathBuf,
    },
}

impl ServerScript {
    /// Path to hand the interpreter.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::External(path) => path,
            Self::Staged { path, .. } => path,
        }
    }

    /// Stage the bundled server script into a fresh temp directory.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::StageScript`] if the directory or file cannot
    /// be created.
    pub fn stage_bundled() -> Result<Self, LaunchError> {
        let dir = tempfile::Builder::new()
            .prefix("pysock-")
            .tempdir()
            .map_err(LaunchError::StageScript)?;
        let path = dir.path().join("server.py");
        std::fs::write(&path, BUNDLED_SERVER).map_err(LaunchError::StageScript)?;
        tracing::debug!(path = %path.display(), "Staged bundled server script");
        Ok(Self::Staged { _dir: dir, path })
    }
}

/// A running companion interpreter process.
///
/// Dropping an un-exited companion kills it, so an early return during
/// startup cannot orphan the interpreter.
#[derive(Debug)]
pub struct CompanionProcess {
    child: Child,
    pid: u32,
    // Held so a staged script is not deleted under the running companion.
    _script: ServerScript,
}

impl CompanionProcess {
    /// Spawn the interpreter with positional arguments
    /// `(server-script-path, port, host)`.
    ///
    /// The spawn is asynchronous: this returns as soon as the OS process
    /// exists, before the companion has bound its listener.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the process fails to spawn.
    pub fn launch(
        python: &Path,
        script: ServerScript,
        port: u16,
        host: &str,
    ) -> Result<Self, LaunchError> {
        let child = Command::new(python)
            .arg(script.path())
            .arg(port.to_string())
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LaunchError::from_io(e, python))?;

        let pid = child.id();
        tracing::info!(pid, port, host, "Launched companion process");
        Ok(Self {
            child,
            pid,
            _script: script,
        })
    }

    /// The OS process id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Poll for exit until `deadline` elapses, reaping the child if it
    /// does exit.
    ///
    /// Returns the exit status, or `None` if the child is still running
    /// when the deadline passes (it is then logged and abandoned to Drop).
    pub fn reap(&mut self, deadline: Duration) -> Option<ExitStatus> {
        let start = Instant::now();
        while start.elapsed() < deadline {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(pid = self.pid, %status, "Reaped companion process");
                    return Some(status);
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    tracing::warn!(pid = self.pid, error = %e, "Failed to poll companion");
                    return None;
                }
            }
        }
        tracing::warn!(pid = self.pid, "Companion did not exit within deadline");
        None
    }

    /// Send SIGKILL to the process.
    ///
    /// Best-effort: does not wait for exit confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered, for example when
    /// no process with this pid exists anymore.
    pub fn force_kill(&mut self) -> std::io::Result<()> {
        tracing::info!(pid = self.pid, "Force-killing companion process");
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(i32::try_from(self.pid).unwrap_or(i32::MAX));
            kill(pid, Signal::SIGKILL).map_err(|e| std::io::Error::from_raw_os_error(e as i32))
        }

        #[cfg(not(unix))]
        {
            self.child.kill()
        }
    }
}

impl Drop for CompanionProcess {
    fn drop(&mut self) {
        // Safety net only; the session stops the companion explicitly.
        if let Ok(None) = self.child.try_wait() {
            tracing::warn!(pid = self.pid, "Companion still alive at drop, killing");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Run one liveness probe round-trip against the companion.
///
/// Sends the probe request and requires at least one line of output.
///
/// # Errors
///
/// Returns [`WireError::EmptyReply`] on a connected-but-silent companion,
/// or the underlying connect/timeout error if it is unreachable.
pub fn probe_alive(host: &str, port: u16, timeout: Duration) -> Result<(), WireError> {
    let reply = wire::round_trip(host, port, timeout, PROBE_REQUEST)?;
    if reply.is_empty() {
        return Err(WireError::EmptyReply);
    }
    tracing::debug!(host, port, "Companion answered liveness probe");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_server_is_embedded() {
        assert!(BUNDLED_SERVER.contains("pysock-error"));
        assert!(BUNDLED_SERVER.contains("PYSOCK_JSON_DUMPS"));
    }

    #[test]
    fn stage_bundled_writes_script() {
        let script = ServerScript::stage_bundled().unwrap();
        let on_disk = std::fs::read_to_string(script.path()).unwrap();
        assert_eq!(on_disk, BUNDLED_SERVER);
    }

    #[test]
    fn staged_script_removed_on_drop() {
        let script = ServerScript::stage_bundled().unwrap();
        let path = script.path().to_path_buf();
        drop(script);
        assert!(!path.exists());
    }

    #[test]
    fn launch_missing_interpreter_is_not_found() {
        let script = ServerScript::External(PathBuf::from("server.py"));
        let result = CompanionProcess::launch(
            Path::new("/nonexistent/bin/python3"),
            script,
            9000,
            "localhost",
        );
        assert!(matches!(result, Err(LaunchError::NotFound(_))));
    }

    // `sh` stands in for the interpreter: it also takes a script path
    // followed by arguments it exposes as positional parameters.
    #[cfg(unix)]
    fn shell_script(body: &str) -> (tempfile::TempDir, ServerScript) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-server.sh");
        std::fs::write(&path, body).unwrap();
        (dir, ServerScript::External(path))
    }

    #[cfg(unix)]
    #[test]
    fn launch_and_force_kill_long_lived_process() {
        let (_dir, script) = shell_script("sleep 30\n");
        let mut process =
            CompanionProcess::launch(Path::new("/bin/sh"), script, 9000, "localhost").unwrap();
        assert!(process.id() > 0);
        assert!(process.try_wait().unwrap().is_none());

        process.force_kill().unwrap();
        let status = process.reap(Duration::from_secs(5));
        assert!(status.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn reap_returns_status_of_exited_process() {
        let (_dir, script) = shell_script("exit 0\n");
        let mut process =
            CompanionProcess::launch(Path::new("/bin/sh"), script, 9000, "localhost").unwrap();
        let status = process.reap(Duration::from_secs(5)).unwrap();
        assert!(status.success());
    }

    #[test]
    fn probe_fails_for_unreachable_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe_alive("127.0.0.1", port, Duration::from_millis(200));
        assert!(matches!(result, Err(WireError::Connect { .. })));
    }
}
