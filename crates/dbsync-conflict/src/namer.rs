//! Conflict naming for keep-both resolution
//!
//! Conflict copies follow the pattern `stem_CONFLICT_YYYY-MM-DD_HHMMSS_.ext`
//! where the stem is everything before the first `.` and the timestamp is
//! the modification time of the local copy, in UTC.

use chrono::{DateTime, Utc};

/// Token identifying conflict copies
pub const CONFLICT_MARKER: &str = "_CONFLICT_";

/// Timestamp layout embedded in conflict names
const STAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Returns true if `path` (a leaf name or a full path) carries the marker
pub fn is_conflict_copy(path: &str) -> bool {
    path.contains(CONFLICT_MARKER)
}

/// Generates conflict file names
pub struct ConflictNamer;

impl ConflictNamer {
    /// Generates the conflict copy name for `original_name`
    ///
    /// Given "report.pdf" modified at 2024-03-01 14:05:09 UTC, produces
    /// "report_CONFLICT_2024-03-01_140509_.pdf". Multi-part extensions stay
    /// intact: "archive.tar.gz" becomes "archive_CONFLICT_..._.tar.gz".
    pub fn generate(original_name: &str, stamp: DateTime<Utc>) -> String {
        let stamp = stamp.format(STAMP_FORMAT);
        match original_name.split_once('.') {
            Some((stem, rest)) => format!("{stem}{CONFLICT_MARKER}{stamp}_.{rest}"),
            None => format!("{original_name}{CONFLICT_MARKER}{stamp}_"),
        }
    }

    /// Like [`generate`](Self::generate), but avoids names that already exist
    ///
    /// Two conflicts on the same file within one second yield the same name;
    /// later ones get an incrementing counter after the timestamp.
    pub fn generate_unique<F>(original_name: &str, stamp: DateTime<Utc>, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let candidate = Self::generate(original_name, stamp);
        if !exists(&candidate) {
            return candidate;
        }

        let stamp = stamp.format(STAMP_FORMAT);
        let mut n = 2u32;
        loop {
            let numbered = match original_name.split_once('.') {
                Some((stem, rest)) => format!("{stem}{CONFLICT_MARKER}{stamp}-{n}_.{rest}"),
                None => format!("{original_name}{CONFLICT_MARKER}{stamp}-{n}_"),
            };
            if !exists(&numbered) {
                return numbered;
            }
            n += 1;
        }
    }
}
