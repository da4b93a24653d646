//! Shared fixtures: an in-memory remote store and a temp-dir sync root
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use dbsync_core::domain::{CommitInfo, RemoteEntry, RemoteFile, RemoteFolder, RemotePath, SessionCursor, WriteMode};
use dbsync_core::ports::{IRemoteStore, RemoteError, RemoteResult};
use dbsync_sync::{Reconciler, SyncRoot, WriteJournal};
use tempfile::TempDir;

pub const MIB: u64 = 1024 * 1024;

/// `2024-01-02 03:04:05 UTC` plus `secs`
pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::seconds(secs)
}

// ============================================================================
// MemoryStore
// ============================================================================

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Download(String),
    Upload { path: String, mode: WriteMode },
    SessionStart { len: u64 },
    SessionAppend { offset: u64, len: u64 },
    SessionFinish { offset: u64, len: u64, path: String },
    CreateFolder(String),
    Delete(String),
    Move { from: String, to: String },
}

impl Call {
    /// Whether the call moves file content
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Call::Download(_)
                | Call::Upload { .. }
                | Call::SessionStart { .. }
                | Call::SessionAppend { .. }
                | Call::SessionFinish { .. }
        )
    }
}

#[derive(Debug, Clone)]
enum MemEntry {
    File { data: Vec<u8>, modified: DateTime<Utc>, rev: u64 },
    Folder,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, MemEntry>,
    sessions: HashMap<String, Vec<u8>>,
    calls: Vec<Call>,
    failing_lists: HashSet<String>,
    fail_uploads: bool,
    fail_downloads: bool,
    grow_on_session_start: Option<(PathBuf, Vec<u8>)>,
    next_id: u64,
}

/// `IRemoteStore` backed by a map from path to entry
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn leaf(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap()
}

impl State {
    fn ensure_parents(&mut self, path: &str) {
        let mut current = String::new();
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for part in &parts[..parts.len().saturating_sub(1)] {
            current.push('/');
            current.push_str(part);
            self.entries.entry(current.clone()).or_insert(MemEntry::Folder);
        }
    }

    fn file_meta(&self, path: &str) -> RemoteResult<RemoteFile> {
        match self.entries.get(path) {
            Some(MemEntry::File { data, modified, rev }) => Ok(RemoteFile {
                name: leaf(path),
                path: RemotePath::new(path).unwrap(),
                size: data.len() as u64,
                modified_at: *modified,
                content_ref: format!("rev{rev}"),
                content_hash: None,
            }),
            _ => Err(RemoteError::NotFound(format!("path/not_found/ {path}"))),
        }
    }

    fn commit(&mut self, path: &str, data: Vec<u8>, mode: WriteMode, modified: DateTime<Utc>) -> RemoteResult<RemoteFile> {
        if self.fail_uploads {
            return Err(RemoteError::Server("upload disabled".into()));
        }
        match (self.entries.get(path), mode) {
            (Some(MemEntry::Folder), _) => {
                return Err(RemoteError::Conflict(format!("path/conflict/folder/ {path}")));
            }
            (Some(MemEntry::File { data: existing, .. }), WriteMode::Add) if *existing != data => {
                return Err(RemoteError::Conflict(format!("path/conflict/file/ {path}")));
            }
            _ => {}
        }
        self.ensure_parents(path);
        self.next_id += 1;
        let rev = self.next_id;
        self.entries.insert(
            path.to_string(),
            MemEntry::File {
                data,
                modified: truncate(modified),
                rev,
            },
        );
        self.file_meta(path)
    }
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn put_file(&self, path: &str, data: &[u8], modified: DateTime<Utc>) {
        let mut state = self.lock();
        state.ensure_parents(path);
        state.next_id += 1;
        let rev = state.next_id;
        state.entries.insert(
            path.to_string(),
            MemEntry::File {
                data: data.to_vec(),
                modified: truncate(modified),
                rev,
            },
        );
    }

    pub fn put_folder(&self, path: &str) {
        let mut state = self.lock();
        state.ensure_parents(path);
        state.entries.insert(path.to_string(), MemEntry::Folder);
    }

    /// Content and modification time of a stored file
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, DateTime<Utc>)> {
        match self.lock().entries.get(path) {
            Some(MemEntry::File { data, modified, .. }) => Some((data.clone(), *modified)),
            _ => None,
        }
    }

    pub fn is_folder(&self, path: &str) -> bool {
        matches!(self.lock().entries.get(path), Some(MemEntry::Folder))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().entries.contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn transfer_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_transfer).collect()
    }

    /// Make listings of `path` fail with a server error
    pub fn fail_listing(&self, path: &str) {
        self.lock().failing_lists.insert(path.to_string());
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.lock().fail_uploads = fail;
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.lock().fail_downloads = fail;
    }

    /// Append `extra` to the local file at `path` when the next upload
    /// session opens, as a writer still busy with the file would
    pub fn grow_on_session_start(&self, path: PathBuf, extra: &[u8]) {
        self.lock().grow_on_session_start = Some((path, extra.to_vec()));
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

#[async_trait::async_trait]
impl IRemoteStore for MemoryStore {
    async fn list_folder(&self, path: &RemotePath, recursive: bool) -> RemoteResult<Vec<RemoteEntry>> {
        self.record(Call::List(path.as_str().to_string()));
        let state = self.lock();
        let key = path.as_str();
        if state.failing_lists.contains(key) {
            return Err(RemoteError::Server(format!("listing {key} failed")));
        }
        if !key.is_empty() && !matches!(state.entries.get(key), Some(MemEntry::Folder)) {
            return Err(RemoteError::NotFound(format!("path/not_found/ {key}")));
        }

        let prefix = format!("{key}/");
        let mut out = Vec::new();
        for (p, entry) in &state.entries {
            let Some(rest) = p.strip_prefix(&prefix) else {
                continue;
            };
            if !recursive && rest.contains('/') {
                continue;
            }
            out.push(match entry {
                MemEntry::Folder => RemoteEntry::Folder(RemoteFolder {
                    name: leaf(p),
                    path: RemotePath::new(p).unwrap(),
                }),
                MemEntry::File { .. } => RemoteEntry::File(state.file_meta(p)?),
            });
        }
        Ok(out)
    }

    async fn download(&self, path: &RemotePath) -> RemoteResult<(RemoteFile, Vec<u8>)> {
        self.record(Call::Download(path.as_str().to_string()));
        let state = self.lock();
        if state.fail_downloads {
            return Err(RemoteError::Server("download disabled".into()));
        }
        let meta = state.file_meta(path.as_str())?;
        let Some(MemEntry::File { data, .. }) = state.entries.get(path.as_str()) else {
            unreachable!();
        };
        Ok((meta, data.clone()))
    }

    async fn upload(
        &self,
        path: &RemotePath,
        data: Vec<u8>,
        mode: WriteMode,
        client_modified: DateTime<Utc>,
    ) -> RemoteResult<RemoteFile> {
        self.record(Call::Upload {
            path: path.as_str().to_string(),
            mode,
        });
        self.lock().commit(path.as_str(), data, mode, client_modified)
    }

    async fn upload_session_start(&self, first_chunk: Vec<u8>) -> RemoteResult<String> {
        self.record(Call::SessionStart {
            len: first_chunk.len() as u64,
        });
        let mut state = self.lock();
        if let Some((path, extra)) = state.grow_on_session_start.take() {
            let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
            std::io::Write::write_all(&mut file, &extra).unwrap();
        }
        state.next_id += 1;
        let id = format!("session-{}", state.next_id);
        state.sessions.insert(id.clone(), first_chunk);
        Ok(id)
    }

    async fn upload_session_append(&self, cursor: &SessionCursor, chunk: Vec<u8>) -> RemoteResult<()> {
        self.record(Call::SessionAppend {
            offset: cursor.offset,
            len: chunk.len() as u64,
        });
        let mut state = self.lock();
        let buffer = state
            .sessions
            .get_mut(&cursor.session_id)
            .ok_or_else(|| RemoteError::NotFound("session/not_found".into()))?;
        if buffer.len() as u64 != cursor.offset {
            return Err(RemoteError::Api("incorrect_offset".into()));
        }
        buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn upload_session_finish(
        &self,
        cursor: &SessionCursor,
        last_chunk: Vec<u8>,
        commit: &CommitInfo,
    ) -> RemoteResult<RemoteFile> {
        self.record(Call::SessionFinish {
            offset: cursor.offset,
            len: last_chunk.len() as u64,
            path: commit.path.as_str().to_string(),
        });
        let mut state = self.lock();
        let mut buffer = state
            .sessions
            .remove(&cursor.session_id)
            .ok_or_else(|| RemoteError::NotFound("session/not_found".into()))?;
        if buffer.len() as u64 != cursor.offset {
            return Err(RemoteError::Api("incorrect_offset".into()));
        }
        buffer.extend_from_slice(&last_chunk);
        state.commit(commit.path.as_str(), buffer, commit.mode, commit.client_modified)
    }

    async fn create_folder(&self, path: &RemotePath) -> RemoteResult<RemoteFolder> {
        self.record(Call::CreateFolder(path.as_str().to_string()));
        let mut state = self.lock();
        if state.entries.contains_key(path.as_str()) {
            return Err(RemoteError::Conflict(format!("path/conflict/folder/ {path}")));
        }
        state.ensure_parents(path.as_str());
        state.entries.insert(path.as_str().to_string(), MemEntry::Folder);
        Ok(RemoteFolder {
            name: leaf(path.as_str()),
            path: path.clone(),
        })
    }

    async fn delete(&self, path: &RemotePath) -> RemoteResult<()> {
        self.record(Call::Delete(path.as_str().to_string()));
        let mut state = self.lock();
        let key = path.as_str().to_string();
        if state.entries.remove(&key).is_none() {
            return Err(RemoteError::NotFound(format!("path_lookup/not_found/ {key}")));
        }
        let prefix = format!("{key}/");
        state.entries.retain(|p, _| !p.starts_with(&prefix));
        Ok(())
    }

    async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> RemoteResult<RemoteEntry> {
        self.record(Call::Move {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
        let mut state = self.lock();
        let (from_key, to_key) = (from.as_str().to_string(), to.as_str().to_string());
        if state.entries.contains_key(&to_key) {
            return Err(RemoteError::Conflict(format!("to/conflict/ {to_key}")));
        }
        let Some(entry) = state.entries.remove(&from_key) else {
            return Err(RemoteError::NotFound(format!("from_lookup/not_found/ {from_key}")));
        };
        let prefix = format!("{from_key}/");
        let children: Vec<(String, MemEntry)> = state
            .entries
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        for (p, e) in children {
            state.entries.remove(&p);
            state.entries.insert(format!("{to_key}/{}", &p[prefix.len()..]), e);
        }
        state.ensure_parents(&to_key);
        let is_folder = matches!(entry, MemEntry::Folder);
        state.entries.insert(to_key.clone(), entry);
        if is_folder {
            Ok(RemoteEntry::Folder(RemoteFolder {
                name: leaf(&to_key),
                path: to.clone(),
            }))
        } else {
            Ok(RemoteEntry::File(state.file_meta(&to_key)?))
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A temp-dir sync root wired to a [`MemoryStore`]
pub struct Harness {
    pub dir: TempDir,
    pub root: Arc<SyncRoot>,
    pub store: Arc<MemoryStore>,
    pub journal: Arc<WriteJournal>,
    pub reconciler: Arc<Reconciler>,
}

pub fn harness() -> Harness {
    harness_with(4 * MIB, WriteJournal::disabled())
}

pub fn harness_with(chunk_size: u64, journal: WriteJournal) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().canonicalize().unwrap();
    let root = Arc::new(SyncRoot::new(local, "", ".dropboxignore").unwrap());
    let store = MemoryStore::new();
    let journal = Arc::new(journal);
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&root),
        Arc::clone(&store) as Arc<dyn IRemoteStore>,
        Arc::clone(&journal),
        chunk_size,
    ));
    Harness {
        dir,
        root,
        store,
        journal,
        reconciler,
    }
}

impl Harness {
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.local_path(rel)
    }

    pub fn write(&self, rel: &str, data: &[u8], modified: DateTime<Utc>) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(modified.timestamp(), 0)).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn mtime(&self, rel: &str) -> DateTime<Utc> {
        DateTime::<Utc>::from(std::fs::metadata(self.path(rel)).unwrap().modified().unwrap())
    }

    /// Local file names (not paths) containing the conflict marker, recursively
    pub fn local_conflicts(&self) -> usize {
        fn walk(dir: &Path) -> usize {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().path())
                .map(|p| {
                    if p.is_dir() {
                        walk(&p)
                    } else {
                        usize::from(p.to_string_lossy().contains("_CONFLICT_"))
                    }
                })
                .sum()
        }
        walk(self.root.local_root())
    }

    pub fn remote_conflicts(&self) -> usize {
        self.store.paths().iter().filter(|p| p.contains("_CONFLICT_")).count()
    }

    pub fn ignore(&self, lines: &str) {
        std::fs::write(self.root.ignore_file_path(), lines).unwrap();
        self.root.reload_ignore();
    }
}

/// A journal that suppresses for a long window
pub fn journal() -> WriteJournal {
    WriteJournal::new(Duration::from_secs(60))
}
