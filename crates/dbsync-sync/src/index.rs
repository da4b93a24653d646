//! Remote directory snapshots
//!
//! A pass asks for one folder at a time and gets a map keyed by entry name.
//! Recursive listings are keyed by the path relative to the listed folder.
//! Listing failures never propagate: a missing folder is an empty folder,
//! any other failure is logged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use dbsync_core::domain::RemoteEntry;
use dbsync_core::ports::IRemoteStore;
use tracing::{debug, error};

use crate::root::SyncRoot;

/// Entries of one remote folder, keyed by name (or relative path)
pub type RemoteListing = BTreeMap<String, RemoteEntry>;

/// Lists remote folders below the sync root
pub struct RemoteDirectoryIndex {
    store: Arc<dyn IRemoteStore>,
    root: Arc<SyncRoot>,
}

impl RemoteDirectoryIndex {
    pub fn new(store: Arc<dyn IRemoteStore>, root: Arc<SyncRoot>) -> Self {
        Self { store, root }
    }

    /// Snapshot of `subfolder` (relative to the sync root)
    ///
    /// Empty when the folder does not exist or the listing failed.
    pub async fn list(&self, subfolder: &str, recursive: bool) -> RemoteListing {
        self.list_checked(subfolder, recursive).await.unwrap_or_default()
    }

    /// Like [`list`](Self::list), but `None` when the listing failed for any
    /// reason other than the folder being absent
    pub async fn list_checked(&self, subfolder: &str, recursive: bool) -> Option<RemoteListing> {
        let folder = match self.root.remote_path(subfolder) {
            Ok(folder) => folder,
            Err(e) => {
                error!(subfolder, error = %e, "Cannot map subfolder to a remote path");
                return None;
            }
        };

        let started = Instant::now();
        let result = self.store.list_folder(&folder, recursive).await;
        debug!(
            folder = %folder,
            recursive,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "list_folder"
        );

        match result {
            Ok(entries) => {
                let mut listing = RemoteListing::new();
                for entry in entries {
                    let key = if recursive {
                        entry
                            .path()
                            .relative_to(&folder)
                            .unwrap_or_else(|| entry.name().to_string())
                    } else {
                        entry.name().to_string()
                    };
                    listing.insert(key, entry);
                }
                Some(listing)
            }
            Err(e) if e.is_not_found() => {
                debug!(folder = %folder, "Remote folder does not exist");
                Some(RemoteListing::new())
            }
            Err(e) => {
                error!(folder = %folder, error = %e, "Failed to list remote folder");
                None
            }
        }
    }
}
