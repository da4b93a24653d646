//! Normalized remote paths
//!
//! Every path sent to the remote store is built from three pieces: the
//! configured remote folder, the subfolder relative to the sync root, and
//! a leaf name. The pieces are glued with `/`, repeated separators are
//! collapsed and trailing separators dropped. The store root itself is the
//! empty string, which is what the Dropbox API expects for listing the root.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::errors::DomainError;

/// Absolute, normalized path on the remote store
///
/// Invariants:
/// - either empty (store root) or starts with a single `/`
/// - never contains `//`, `.` or `..` components
/// - never ends with `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath(String);

impl RemotePath {
    /// Normalize `raw` into a remote path
    ///
    /// # Errors
    /// Returns error if a component is `.` or `..`
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let mut normalized = String::with_capacity(raw.len() + 1);
        for component in raw.split(['/', '\\']).filter(|c| !c.is_empty()) {
            if component == "." || component == ".." {
                return Err(DomainError::InvalidRemotePath(format!(
                    "relative component in remote path: {raw}"
                )));
            }
            normalized.push('/');
            normalized.push_str(component);
        }
        Ok(Self(normalized))
    }

    /// Build `/{remote_folder}/{subfolder}/{name}` and normalize it
    ///
    /// Any of the three pieces may be empty.
    pub fn from_parts(remote_folder: &str, subfolder: &str, name: &str) -> Result<Self, DomainError> {
        Self::new(&format!("/{remote_folder}/{subfolder}/{name}"))
    }

    /// The store root
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path as sent to the API (`""` for the root)
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append one or more `/`-separated components
    ///
    /// # Errors
    /// Returns error if the result would contain `.` or `..`
    pub fn join(&self, tail: &str) -> Result<Self, DomainError> {
        Self::new(&format!("{}/{tail}", self.0))
    }

    /// Parent path, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Last component, `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Strip `base` from the front of this path
    ///
    /// Comparison is ASCII case-insensitive because the store reports
    /// `path_display` with the casing of the original upload.
    #[must_use]
    pub fn relative_to(&self, base: &RemotePath) -> Option<String> {
        if base.is_root() {
            return Some(self.0.trim_start_matches('/').to_string());
        }
        let head = self.0.get(..base.0.len())?;
        if !head.eq_ignore_ascii_case(&base.0) {
            return None;
        }
        let rest = &self.0[base.0.len()..];
        if rest.is_empty() {
            Some(String::new())
        } else {
            rest.strip_prefix('/').map(str::to_string)
        }
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}
