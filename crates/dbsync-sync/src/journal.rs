//! Paths recently written by the engine
//!
//! Every local write, rename or delete performed by the reconciler is
//! recorded here first. The event bridge drops notifications for a recorded
//! path while its entry is younger than the suppression window, so remote
//! content written locally is not echoed straight back.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

/// Recently touched local paths
#[derive(Debug)]
pub struct WriteJournal {
    window: Duration,
    entries: DashMap<PathBuf, Instant>,
}

impl WriteJournal {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// A journal that never suppresses anything
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Record that the engine is about to touch `path`
    pub fn record(&self, path: &Path) {
        if self.window.is_zero() {
            return;
        }
        self.entries.retain(|_, at| at.elapsed() < self.window);
        self.entries.insert(path.to_path_buf(), Instant::now());
        trace!(path = %path.display(), "Journaled local write");
    }

    /// Whether `path` was touched by the engine within the window
    pub fn is_recent(&self, path: &Path) -> bool {
        self.entries
            .get(path)
            .is_some_and(|at| at.elapsed() < self.window)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
