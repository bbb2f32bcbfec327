//! The tracking daemon.
//!
//! One task owns the tracker and its database. Activity signals, idle ticks
//! and shutdown are multiplexed with `select!`, so tracker operations never
//! interleave.

pub mod state;
pub mod watcher;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use hh_core::{Aggregate, Collection, Event, Session, Tracker, TrackerConfig};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::Config;
use crate::commands::util::open_database;
use state::StateFile;
use watcher::{DEBOUNCE_WINDOW, Debouncer, ExcludeSet};

/// Runs the daemon in the foreground until Ctrl-C or `SIGTERM`.
pub fn run(config: &Config) -> Result<()> {
    let instance = StateFile::new(&config.state_path).claim(Utc::now())?;
    tracing::info!(pid = instance.state().pid, "daemon starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    let result = runtime.block_on(serve(config));

    if let Err(err) = instance.release() {
        tracing::warn!(error = %err, "failed to clear daemon state");
    }
    tracing::info!("daemon stopped");
    result
}

async fn serve(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let tracker_config = TrackerConfig::new(config.idle_minutes, config.directories.clone());
    let mut tracker = Tracker::new(db, tracker_config);

    match tracker.close_orphaned_sessions() {
        Ok(closed) if !closed.is_empty() => {
            tracing::info!(count = closed.len(), "recovered sessions from previous run");
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "failed to recover open sessions"),
    }

    let excludes = ExcludeSet::new(&config.exclude).context("invalid exclude pattern")?;
    let (tx, rx) = mpsc::unbounded_channel();
    let _watcher = watcher::spawn(&config.directories, excludes, tx)
        .context("failed to start file watcher")?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("shutdown requested");
        token.cancel();
    });

    let interval = Duration::from_secs(config.idle_check_interval_secs.max(1));
    run_loop(&mut tracker, rx, interval, cancel).await;
    Ok(())
}

/// Drives the tracker until `cancel` fires, then closes the open session.
///
/// Queued signals are handled before idle checks and shutdown. Store
/// failures are logged and the offending signal or tick is dropped.
pub async fn run_loop<S, Tz>(
    tracker: &mut Tracker<S, Tz>,
    mut signals: UnboundedReceiver<PathBuf>,
    check_interval: Duration,
    cancel: CancellationToken,
) where
    S: Collection<Session> + Collection<Event> + Collection<Aggregate>,
    Tz: TimeZone,
{
    let mut ticker = tokio::time::interval(check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut debouncer = Debouncer::new(DEBOUNCE_WINDOW);

    loop {
        tokio::select! {
            biased;

            Some(path) = signals.recv() => {
                if !debouncer.admit(&path, Instant::now()) {
                    continue;
                }
                if let Err(err) = tracker.on_activity(&path, Utc::now()) {
                    tracing::warn!(path = %path.display(), error = %err, "dropped activity signal");
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = tracker.on_idle_check(Utc::now()) {
                    tracing::warn!(error = %err, "idle check failed");
                }
            }
            () = cancel.cancelled() => break,
        }
    }

    match tracker.on_stop(Utc::now()) {
        Ok(Some(session)) => {
            tracing::info!(session_id = %session.session_id, "closed session on shutdown");
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "failed to close session on shutdown"),
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
