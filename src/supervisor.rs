//! Daemon Supervisor (C3).
//!
//! Owns the lifecycle of a single out-of-process inference daemon: checks a
//! PID file for an already-running process, forks one if none is live, and
//! never signals it to stop. A daemon that's already up (including one left
//! over from a prior host process) is adopted rather than restarted.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;

/// Default time given to a freshly spawned daemon before the first liveness
/// re-probe, used unless the caller configures a different settle duration.
const DEFAULT_SPAWN_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonLiveness {
    Running,
    NotRunning,
}

pub struct DaemonSupervisor {
    pid_file: PathBuf,
    binary: PathBuf,
    args: Vec<String>,
    spawn_settle: Duration,
}

impl DaemonSupervisor {
    pub fn new(pid_file: impl Into<PathBuf>, binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            pid_file: pid_file.into(),
            binary: binary.into(),
            args,
            spawn_settle: DEFAULT_SPAWN_SETTLE,
        }
    }

    pub fn with_spawn_settle(mut self, spawn_settle: Duration) -> Self {
        self.spawn_settle = spawn_settle;
        self
    }

    /// Ensure the daemon is running, spawning it if necessary. Idempotent:
    /// calling this repeatedly while the daemon is healthy is a no-op beyond
    /// the liveness probe.
    pub async fn ensure_running(&self) -> Result<DaemonLiveness> {
        if let Some(pid) = self.read_pid_file().await? {
            if process_alive(pid) {
                return Ok(DaemonLiveness::Running);
            }
            tracing::warn!(pid, pid_file = %self.pid_file.display(), "stale pid file, process is dead");
            self.cleanup_stale(pid).await;
        }

        self.spawn().await?;

        sleep(self.spawn_settle).await;

        match self.read_pid_file().await? {
            Some(pid) if process_alive(pid) => Ok(DaemonLiveness::Running),
            _ => Ok(DaemonLiveness::NotRunning),
        }
    }

    async fn read_pid_file(&self) -> Result<Option<u32>> {
        match tokio::fs::read_to_string(&self.pid_file).await {
            Ok(content) => Ok(content.trim().parse::<u32>().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Remove the pid file (and any stray socket path matching the daemon's
    /// name) once a pid has been confirmed dead. This crate never signals a
    /// live process to exit — only a confirmed-dead pid's leftovers are
    /// cleaned up.
    async fn cleanup_stale(&self, pid: u32) {
        tracing::info!(pid, "cleaning up stale daemon artifacts");
        tokio::fs::remove_file(&self.pid_file).await.ok();
    }

    async fn spawn(&self) -> Result<()> {
        tracing::info!(binary = %self.binary.display(), "spawning inference daemon");
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args);
        cmd.kill_on_drop(false);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| Error::Supervisor(format!("failed to spawn daemon: {e}")))?;

        // The daemon is responsible for writing its own pid file once it
        // has bound its listening socket; we only need the child to outlive
        // this call, which `kill_on_drop(false)` plus dropping `child`
        // guarantees (no handle is retained, so no SIGKILL on scope exit).
        std::mem::drop(child);
        Ok(())
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond existence/permission checks.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

/// Called by a daemon binary itself once it has bound its listening socket:
/// writes its own pid to `pid_file` so supervisors elsewhere can observe it.
pub async fn write_pid_file(pid_file: impl AsRef<Path>, pid: u32) -> Result<()> {
    tokio::fs::write(pid_file.as_ref(), pid.to_string()).await?;
    Ok(())
}
