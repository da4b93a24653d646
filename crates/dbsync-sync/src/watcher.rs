//! Filesystem notifications for the sync root
//!
//! Wraps a `notify` watcher and turns its raw events into [`FsEvent`]s.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  notify callback ──→ mpsc ──→ forwarder task (EventMapper) ──→ mpsc ──→ EventBridge
//! ```
//!
//! Renames arrive from some backends as separate "from" and "to" halves.
//! The [`EventMapper`] pairs them through the rename tracker; a "from" half
//! without a partner within the pairing window was moved out of the tree
//! and is reported as a deletion.
//!
//! Editor swap files and partial downloads are filtered here via
//! [`TRANSIENT_PATTERNS`] and never reach the bridge, except as the source of
//! a move (a temp file renamed over its target).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::ignore::IgnoreMatcher;

/// File name patterns suppressed at the source
pub const TRANSIENT_PATTERNS: &[&str] = &["*.swp", "*.goutputstream*", "*.dbsync-partial"];

/// How long a rename "from" half waits for its "to" half
const PAIRING_WINDOW: Duration = Duration::from_millis(200);

const CHANNEL_CAPACITY: usize = 1024;

/// Matcher for [`TRANSIENT_PATTERNS`]
pub fn transient_matcher() -> IgnoreMatcher {
    IgnoreMatcher::compile(TRANSIENT_PATTERNS.iter().copied())
}

// ============================================================================
// FsEvent
// ============================================================================

/// A change below the sync root, paths absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created { path: PathBuf, is_dir: bool },
    Modified { path: PathBuf },
    Deleted { path: PathBuf, is_dir: bool },
    Moved { from: PathBuf, to: PathBuf, is_dir: bool },
}

impl FsEvent {
    /// Every path the event touches
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FsEvent::Created { path, .. } | FsEvent::Modified { path } | FsEvent::Deleted { path, .. } => {
                vec![path.as_path()]
            }
            FsEvent::Moved { from, to, .. } => vec![from.as_path(), to.as_path()],
        }
    }
}

// ============================================================================
// EventMapper
// ============================================================================

struct PendingRename {
    from: PathBuf,
    tracker: Option<usize>,
    to: Option<PathBuf>,
    since: Instant,
}

/// Converts raw `notify` events into [`FsEvent`]s
pub struct EventMapper {
    pending: Vec<PendingRename>,
    transient: IgnoreMatcher,
    window: Duration,
}

impl EventMapper {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Vec::new(),
            transient: transient_matcher(),
            window,
        }
    }

    /// Map one raw event; may yield nothing (halves of renames, metadata)
    pub fn push(&mut self, event: notify::Event, now: Instant) -> Vec<FsEvent> {
        let tracker = event.tracker();
        let mut paths = event.paths.into_iter();
        let mapped = match event.kind {
            EventKind::Create(kind) => paths.next().map(|path| {
                let is_dir = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                };
                FsEvent::Created { path, is_dir }
            }),

            // mtime updates from our own downloads land here as well
            EventKind::Modify(ModifyKind::Metadata(_)) => None,

            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                if let Some(from) = paths.next() {
                    self.pending.push(PendingRename {
                        from,
                        tracker,
                        to: None,
                        since: now,
                    });
                }
                None
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let to = paths.next();
                let partner = self
                    .pending
                    .iter_mut()
                    .find(|p| p.to.is_none() && tracker.is_some() && p.tracker == tracker);
                match (partner, to) {
                    (Some(partner), Some(to)) => {
                        partner.to = Some(to);
                        None
                    }
                    (None, Some(path)) => {
                        let is_dir = path.is_dir();
                        Some(FsEvent::Created { path, is_dir })
                    }
                    (_, None) => None,
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => {
                    self.pending.retain(|p| p.from != from);
                    let is_dir = to.is_dir();
                    Some(FsEvent::Moved { from, to, is_dir })
                }
                (Some(path), None) => Some(FsEvent::Modified { path }),
                _ => None,
            },

            EventKind::Modify(ModifyKind::Name(_)) => paths.next().map(|path| {
                if path.exists() {
                    let is_dir = path.is_dir();
                    FsEvent::Created { path, is_dir }
                } else {
                    FsEvent::Deleted { path, is_dir: false }
                }
            }),

            EventKind::Modify(_) => paths.next().map(|path| FsEvent::Modified { path }),

            EventKind::Remove(kind) => paths.next().map(|path| FsEvent::Deleted {
                path,
                is_dir: matches!(kind, RemoveKind::Folder),
            }),

            _ => None,
        };

        let mut out = self.flush_expired(now);
        out.extend(mapped.filter(|e| self.keep(e)));
        out
    }

    /// Resolve rename halves older than the pairing window
    pub fn flush_expired(&mut self, now: Instant) -> Vec<FsEvent> {
        let window = self.window;
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| now.saturating_duration_since(p.since) >= window);
        self.pending = pending;
        self.resolve(expired)
    }

    /// Resolve every pending rename half
    pub fn flush_all(&mut self) -> Vec<FsEvent> {
        let pending = std::mem::take(&mut self.pending);
        self.resolve(pending)
    }

    fn resolve(&self, renames: Vec<PendingRename>) -> Vec<FsEvent> {
        renames
            .into_iter()
            .map(|p| match p.to {
                Some(to) => {
                    let is_dir = to.is_dir();
                    FsEvent::Moved { from: p.from, to, is_dir }
                }
                None => FsEvent::Deleted {
                    path: p.from,
                    is_dir: false,
                },
            })
            .filter(|e| self.keep(e))
            .collect()
    }

    fn keep(&self, event: &FsEvent) -> bool {
        let checked = match event {
            FsEvent::Created { path, .. } | FsEvent::Modified { path } | FsEvent::Deleted { path, .. } => path,
            FsEvent::Moved { to, .. } => to,
        };
        let transient = checked
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.transient.is_ignored(name, false));
        if transient {
            trace!(path = %checked.display(), "Dropping transient file event");
        }
        !transient
    }
}

// ============================================================================
// FsWatcher
// ============================================================================

/// Recursive watch over the sync root
///
/// Dropping it (or calling [`stop`](Self::stop)) closes the event channel.
pub struct FsWatcher {
    watcher: RecommendedWatcher,
    forwarder: JoinHandle<()>,
}

impl FsWatcher {
    /// Start watching `root` recursively
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the OS watcher cannot be created or `root` cannot
    /// be watched (missing, permissions, inotify watch limit)
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<FsEvent>)> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Event>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<FsEvent>(CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if raw_tx.blocking_send(event).is_err() {
                        debug!("Watcher event dropped (forwarder stopped)");
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", root.display()))?;
        info!(path = %root.display(), "Watching sync root");

        let forwarder = tokio::spawn(forward(raw_rx, event_tx, EventMapper::new(PAIRING_WINDOW)));
        Ok((Self { watcher, forwarder }, event_rx))
    }

    /// Stop watching and wait for pending events to be delivered
    pub async fn stop(self) {
        let Self { watcher, forwarder } = self;
        drop(watcher);
        if let Err(e) = forwarder.await {
            error!(error = %e, "Watcher forwarder task failed");
        }
        info!("Stopped watching");
    }
}

async fn forward(mut raw_rx: mpsc::Receiver<notify::Event>, tx: mpsc::Sender<FsEvent>, mut mapper: EventMapper) {
    let mut tick = tokio::time::interval(PAIRING_WINDOW);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let events = tokio::select! {
            raw = raw_rx.recv() => match raw {
                Some(event) => mapper.push(event, Instant::now()),
                None => {
                    for event in mapper.flush_all() {
                        let _ = tx.send(event).await;
                    }
                    return;
                }
            },
            _ = tick.tick() => mapper.flush_expired(Instant::now()),
        };

        for event in events {
            trace!(?event, "Forwarding filesystem event");
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}
