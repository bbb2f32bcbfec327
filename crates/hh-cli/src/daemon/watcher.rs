//! Filesystem watcher bridge.
//!
//! Forwards create and data-modify notifications under the tracked
//! directories as activity signals, minus excluded paths. Debouncing happens
//! on the receiving side, where the daemon loop owns the state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use glob::{MatchOptions, Pattern, PatternError};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

/// Window within which repeated signals for one path collapse into one.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Entry count above which stale debounce entries are pruned.
const DEBOUNCE_PRUNE_THRESHOLD: usize = 1024;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled exclude globs.
///
/// `**` spans path segments, `*` and `?` stay within one, `[...]` matches a
/// character class and `{a,b}` expands to alternatives. Patterns match the
/// whole path.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self, PatternError> {
        let mut patterns = Vec::new();
        for glob in globs {
            for alternative in expand_braces(glob.as_ref()) {
                patterns.push(Pattern::new(&alternative)?);
            }
        }
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_path_with(path, MATCH_OPTIONS))
    }
}

/// Expands the first `{a,b,...}` group and recurses into each result.
///
/// An unclosed `{` is kept literally.
fn expand_braces(glob: &str) -> Vec<String> {
    let Some(open) = glob.find('{') else {
        return vec![glob.to_string()];
    };
    let mut depth = 0usize;
    let mut bounds = vec![open];
    let mut close = None;
    for (offset, c) in glob[open..].char_indices() {
        let index = open + offset;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(index);
                    break;
                }
            }
            ',' if depth == 1 => bounds.push(index),
            _ => {}
        }
    }
    let Some(close) = close else {
        return vec![glob.to_string()];
    };
    bounds.push(close);

    let (prefix, suffix) = (&glob[..open], &glob[close + 1..]);
    bounds
        .windows(2)
        .flat_map(|pair| {
            let alternative = &glob[pair[0] + 1..pair[1]];
            expand_braces(&format!("{prefix}{alternative}{suffix}"))
        })
        .collect()
}

/// Per-path debounce over a fixed window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Returns whether a signal for `path` at `now` should be forwarded.
    pub fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let recent = self
            .last_seen
            .get(path)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.window);
        if recent {
            return false;
        }
        if self.last_seen.len() >= DEBOUNCE_PRUNE_THRESHOLD {
            let window = self.window;
            self.last_seen
                .retain(|_, last| now.saturating_duration_since(*last) < window);
        }
        self.last_seen.insert(path.to_path_buf(), now);
        true
    }
}

fn is_activity(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(
                ModifyKind::Any
                    | ModifyKind::Data(_)
                    | ModifyKind::Name(RenameMode::To | RenameMode::Both)
            )
    )
}

/// Starts a recursive watcher over `directories`, sending touched paths to `tx`.
///
/// The watcher stops when the returned handle is dropped. Directories that
/// cannot be watched are logged and skipped.
pub fn spawn(
    directories: &[PathBuf],
    excludes: ExcludeSet,
    tx: UnboundedSender<PathBuf>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "watch error");
                return;
            }
        };
        if !is_activity(&event.kind) {
            return;
        }
        for path in event.paths {
            if path.is_dir() || excludes.is_excluded(&path) {
                continue;
            }
            // The receiver is gone once the daemon is shutting down.
            if tx.send(path).is_err() {
                return;
            }
        }
    })?;

    for dir in directories {
        match watcher.watch(dir, RecursiveMode::Recursive) {
            Ok(()) => tracing::info!(dir = %dir.display(), "watching"),
            Err(err) => tracing::warn!(dir = %dir.display(), error = %err, "cannot watch directory"),
        }
    }
    Ok(watcher)
}
