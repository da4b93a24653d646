//! Ignore-list matching
//!
//! The sync root may carry an ignore file (`.dropboxignore` by default) with
//! one shell-style glob per line. All patterns are compiled into a single
//! predicate:
//!
//! - a pattern without `/` matches the leaf name of a path at any depth
//! - a pattern containing `/` matches the whole path relative to the root
//!   (a leading `/` only anchors, it is stripped)
//! - a pattern ending in `/` only matches directories
//! - blank lines and lines starting with `#` are skipped
//!
//! Lines that fail to compile are logged and skipped; the rest still apply.
//! An empty list matches nothing.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

/// Compiled ignore predicate
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    /// Source patterns that compiled, in file order
    patterns: Vec<String>,
    /// Patterns matched against the leaf name
    names: GlobSet,
    names_dir_only: Vec<bool>,
    /// Patterns matched against the root-relative path
    paths: GlobSet,
    paths_dir_only: Vec<bool>,
}

impl Default for IgnoreMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreMatcher {
    /// A matcher that ignores nothing
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            names: GlobSet::empty(),
            names_dir_only: Vec::new(),
            paths: GlobSet::empty(),
            paths_dir_only: Vec::new(),
        }
    }

    /// Compile ignore-file lines into one predicate
    pub fn compile<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        let mut names = GlobSetBuilder::new();
        let mut names_dir_only = Vec::new();
        let mut paths = GlobSetBuilder::new();
        let mut paths_dir_only = Vec::new();

        for line in lines {
            let line = line.as_ref().trim_end();
            if line.trim_start().is_empty() || line.starts_with('#') {
                continue;
            }

            let (body, dir_only) = match line.strip_suffix('/') {
                Some(body) => (body, true),
                None => (line, false),
            };
            let anchored = body.contains('/');
            let body = body.trim_start_matches('/');
            if body.is_empty() {
                warn!(pattern = line, "Skipping empty ignore pattern");
                continue;
            }

            let glob = match GlobBuilder::new(body).literal_separator(true).build() {
                Ok(glob) => glob,
                Err(e) => {
                    warn!(pattern = line, error = %e, "Skipping malformed ignore pattern");
                    continue;
                }
            };

            if anchored {
                paths.add(glob);
                paths_dir_only.push(dir_only);
            } else {
                names.add(glob);
                names_dir_only.push(dir_only);
            }
            patterns.push(line.to_string());
        }
        debug!(patterns = ?patterns, "Compiled exclude list");

        Self {
            patterns,
            names: build_set(names),
            names_dir_only,
            paths: build_set(paths),
            paths_dir_only,
        }
    }

    /// Load and compile the ignore file at `path`
    ///
    /// A missing file yields an empty matcher. Any other read failure is
    /// logged and also yields an empty matcher.
    pub fn load(path: &Path) -> Self {
        let matcher = match std::fs::read_to_string(path) {
            Ok(content) => Self::compile(content.lines()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "No ignore file");
                Self::empty()
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read ignore file");
                Self::empty()
            }
        };

        if !matcher.is_empty() {
            info!(
                file = %path.display(),
                patterns = ?matcher.patterns,
                "Ignoring paths matching"
            );
        }
        matcher
    }

    /// Whether `rel_path` (relative to the root, `/`-separated) is ignored
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let rel_path = rel_path.trim_matches('/');
        if rel_path.is_empty() {
            return false;
        }
        let leaf = rel_path.rsplit('/').next().unwrap_or(rel_path);

        let hit = |set: &GlobSet, dir_only: &[bool], candidate: &str| {
            set.matches(candidate)
                .into_iter()
                .any(|i| is_dir || !dir_only.get(i).copied().unwrap_or(false))
        };

        hit(&self.names, &self.names_dir_only, leaf) || hit(&self.paths, &self.paths_dir_only, rel_path)
    }

    /// The patterns in effect
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn build_set(builder: GlobSetBuilder) -> GlobSet {
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build ignore set, ignoring nothing");
        GlobSet::empty()
    })
}
