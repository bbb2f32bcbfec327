//! Daemon state file and process liveness.
//!
//! The running daemon holds an exclusive lock on `daemon.lock` for its whole
//! lifetime and records itself in the state file. A record whose lock is free
//! is stale and treated as "not running". Every read-check-write of the
//! record happens under a second lock, `state.lock`, so two processes can
//! never both decide the slot is free.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, Signal, System};
use thiserror::Error;

const INSTANCE_LOCK: &str = "daemon.lock";
const GUARD_LOCK: &str = "state.lock";

/// Errors from daemon lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("hackhours is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },
    #[error("hackhours is already running (lock held on {path})")]
    Locked { path: PathBuf },
    #[error("hackhours is not running")]
    NotRunning,
    #[error("failed to access state file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid state file {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path, source: std::io::Error) -> LifecycleError {
    LifecycleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// The recorded daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Handle to the state file on disk.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file the running daemon keeps locked.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_file_name(INSTANCE_LOCK)
    }

    fn guard_path(&self) -> PathBuf {
        self.path.with_file_name(GUARD_LOCK)
    }

    /// Blocks until this process owns the guard lock. Dropping the file
    /// releases it.
    fn lock_guard(&self) -> Result<File, LifecycleError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let path = self.guard_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        file.lock_exclusive()
            .map_err(|source| io_error(&path, source))?;
        Ok(file)
    }

    /// Whether some process holds the instance lock. Call with the guard held.
    fn lock_held(&self) -> Result<bool, LifecycleError> {
        let path = self.lock_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(io_error(&path, source)),
        };
        match file.try_lock_exclusive() {
            Ok(()) => Ok(false),
            Err(err) if is_contended(&err) => Ok(true),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    /// Reads the recorded state, if any.
    pub fn read(&self) -> Result<Option<DaemonState>, LifecycleError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&self.path, source)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| LifecycleError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Returns the recorded state while its daemon holds the instance lock.
    pub fn running(&self) -> Result<Option<DaemonState>, LifecycleError> {
        let _guard = self.lock_guard()?;
        if !self.lock_held()? {
            return Ok(None);
        }
        self.read()
    }

    pub fn write(&self, state: &DaemonState) -> Result<(), LifecycleError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|source| {
            LifecycleError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|source| io_error(&self.path, source))
    }

    /// Removes the state file. Missing files are not an error.
    pub fn clear(&self) -> Result<(), LifecycleError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }

    /// Makes the current process the daemon.
    ///
    /// Takes the instance lock and records the current pid. The returned
    /// [`InstanceLock`] must live as long as the daemon.
    pub fn claim(&self, now: DateTime<Utc>) -> Result<InstanceLock, LifecycleError> {
        let _guard = self.lock_guard()?;
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if is_contended(&err) => {
                return Err(match self.read()? {
                    Some(state) => LifecycleError::AlreadyRunning { pid: state.pid },
                    None => LifecycleError::Locked { path },
                });
            }
            Err(source) => return Err(io_error(&path, source)),
        }

        let state = DaemonState {
            pid: std::process::id(),
            started_at: now,
        };
        self.write(&state)?;
        Ok(InstanceLock {
            state_file: self.clone(),
            state,
            _file: file,
        })
    }

    /// Removes the record if it still names `pid`. Returns whether it did.
    pub fn clear_if_owned_by(&self, pid: u32) -> Result<bool, LifecycleError> {
        let _guard = self.lock_guard()?;
        match self.read()? {
            Some(state) if state.pid == pid => self.clear().map(|()| true),
            _ => Ok(false),
        }
    }

    /// Removes a record left behind by a daemon that no longer holds the
    /// instance lock, returning it.
    pub fn clear_stale(&self) -> Result<Option<DaemonState>, LifecycleError> {
        let _guard = self.lock_guard()?;
        if self.lock_held()? {
            return Ok(None);
        }
        let stale = self.read()?;
        if stale.is_some() {
            self.clear()?;
        }
        Ok(stale)
    }
}

/// Proof that the current process is the daemon.
///
/// Dropping it frees the instance lock. [`InstanceLock::release`] also
/// removes the record.
#[derive(Debug)]
pub struct InstanceLock {
    state_file: StateFile,
    state: DaemonState,
    _file: File,
}

impl InstanceLock {
    pub const fn state(&self) -> DaemonState {
        self.state
    }

    /// Clears the record if it still names this daemon, then unlocks.
    pub fn release(self) -> Result<(), LifecycleError> {
        self.state_file
            .clear_if_owned_by(self.state.pid)
            .map(|_| ())
    }
}

fn refreshed(pid: Pid) -> System {
    let mut sys = System::new();
    sys.refresh_process_specifics(pid, ProcessRefreshKind::new());
    sys
}

/// Whether a process with `pid` exists and has not exited.
///
/// Zombies count as gone: they have exited and only wait to be reaped.
pub fn is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    refreshed(pid)
        .process(pid)
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// Asks the process to terminate, falling back to a hard kill where
/// `SIGTERM` is unsupported. Returns whether a signal was delivered.
pub fn terminate(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let sys = refreshed(pid);
    let Some(process) = sys.process(pid) else {
        return false;
    };
    process
        .kill_with(Signal::Term)
        .unwrap_or_else(|| process.kill())
}
