//! Start and stop commands for the background daemon.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::Config;
use crate::daemon::state::{self, DaemonState, LifecycleError, StateFile};

/// How long `start` waits for the daemon to record itself.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
/// How long `stop` waits for the daemon to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns `hackhours daemon` detached from the terminal and waits for it to
/// claim the state file.
///
/// The daemon records itself, so a child that loses a race against another
/// `start` exits without touching the record. Its output goes to the log
/// file next to the state file.
pub fn start<W: Write>(writer: &mut W, config: &Config, config_path: Option<&Path>) -> Result<()> {
    let state_file = StateFile::new(&config.state_path);
    if let Some(running) = state_file.running()? {
        return Err(LifecycleError::AlreadyRunning { pid: running.pid }.into());
    }

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create state directory")?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let exe = std::env::current_exe().context("failed to locate hackhours executable")?;
    let mut command = Command::new(exe);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    command
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command.spawn().context("failed to spawn daemon")?;
    tracing::info!(pid = child.id(), "daemon spawned");

    let state = wait_for_claim(&state_file, &mut child, &log_path)?;
    writeln!(writer, "hackhours started (pid {})", state.pid)?;
    writeln!(writer, "Logs: {}", log_path.display())?;
    Ok(())
}

fn wait_for_claim(
    state_file: &StateFile,
    child: &mut Child,
    log_path: &Path,
) -> Result<DaemonState> {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        if let Some(state) = state_file.running()?.filter(|s| s.pid == child.id()) {
            return Ok(state);
        }
        if let Some(status) = child.try_wait()? {
            if let Some(other) = state_file.running()? {
                return Err(LifecycleError::AlreadyRunning { pid: other.pid }.into());
            }
            anyhow::bail!(
                "daemon exited during startup ({status}); see {}",
                log_path.display()
            );
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "daemon (pid {}) did not start within {}s; see {}",
                child.id(),
                STARTUP_TIMEOUT.as_secs(),
                log_path.display()
            );
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Terminates the running daemon and clears its state.
///
/// A record with no daemon behind it is cleared and reported as not running.
pub fn stop<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let state_file = StateFile::new(&config.state_path);
    let Some(recorded) = state_file.running()? else {
        if let Some(stale) = state_file.clear_stale()? {
            tracing::debug!(pid = stale.pid, "cleared stale daemon state");
        }
        return Err(LifecycleError::NotRunning.into());
    };

    if !state::terminate(recorded.pid) {
        anyhow::bail!("failed to signal hackhours daemon (pid {})", recorded.pid);
    }
    let deadline = Instant::now() + STOP_TIMEOUT;
    while state::is_alive(recorded.pid)
        && state_file
            .running()?
            .is_some_and(|state| state.pid == recorded.pid)
    {
        if Instant::now() >= deadline {
            anyhow::bail!(
                "hackhours daemon (pid {}) did not exit within {}s",
                recorded.pid,
                STOP_TIMEOUT.as_secs()
            );
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    state_file.clear_if_owned_by(recorded.pid)?;

    writeln!(writer, "hackhours stopped (pid {})", recorded.pid)?;
    Ok(())
}
