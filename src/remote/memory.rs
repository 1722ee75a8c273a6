//! In-memory share connector for testing.
//!
//! Holds every share of every host in a single map and lets tests inject the
//! failures a real network produces: unreachable hosts, rejected writes,
//! writes that silently vanish, writes cut off halfway and rejected deletes.

use super::{EntryFilter, FileAttributes, ShareConnection, ShareConnector, ShareEntry};
use crate::models::RemoteHost;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// `(host address, share, path)`.
type PathKey = (String, String, String);

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathKey, StoredFile>,
    dirs: BTreeSet<PathKey>,
    unreachable: HashSet<String>,
    failing_writes: HashSet<String>,
    lost_writes: HashSet<String>,
    interrupted_writes: HashSet<String>,
    failing_deletes: HashSet<String>,
}

impl MemoryState {
    fn dir_exists(&self, host: &str, share: &str, dir: &str) -> bool {
        if dir == "/" {
            return true;
        }
        let key = (host.to_string(), share.to_string(), dir.to_string());
        self.dirs.contains(&key)
            || self.dirs.iter().any(|(h, s, p)| h == host && s == share && p.starts_with(dir))
            || self
                .files
                .keys()
                .any(|(h, s, p)| h == host && s == share && p.starts_with(dir))
    }
}

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    connects: AtomicUsize,
    writes: AtomicUsize,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(host: &str, share: &str, path: &str) -> PathKey {
    (host.to_string(), share.to_string(), path.to_string())
}

fn dir_key(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Thread-safe in-memory file shares.
///
/// # Example
///
/// ```rust,ignore
/// use mirrorkeep::remote::InMemoryShareConnector;
///
/// let connector = InMemoryShareConnector::new();
/// connector.put_file("10.0.0.1", "data", "/in/a.zip", b"...", chrono::Utc::now());
/// connector.set_unreachable("10.0.0.2", true);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryShareConnector {
    state: Arc<Mutex<MemoryState>>,
    counters: Arc<Counters>,
}

impl InMemoryShareConnector {
    /// Creates a connector with no hosts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a file with an explicit modification time.
    pub fn put_file(
        &self,
        host: &str,
        share: &str,
        path: &str,
        content: &[u8],
        last_modified: DateTime<Utc>,
    ) {
        lock(&self.state).files.insert(
            key(host, share, path),
            StoredFile {
                content: content.to_vec(),
                last_modified,
            },
        );
    }

    /// Creates an empty directory.
    pub fn create_dir(&self, host: &str, share: &str, path: &str) {
        lock(&self.state).dirs.insert(key(host, share, &dir_key(path)));
    }

    /// Returns the content of a file, if present.
    #[must_use]
    pub fn read_file(&self, host: &str, share: &str, path: &str) -> Option<Vec<u8>> {
        lock(&self.state)
            .files
            .get(&key(host, share, path))
            .map(|file| file.content.clone())
    }

    /// Names of the files directly inside `dir`, sorted.
    #[must_use]
    pub fn file_names(&self, host: &str, share: &str, dir: &str) -> Vec<String> {
        let dir = dir_key(dir);
        lock(&self.state)
            .files
            .keys()
            .filter(|(h, s, _)| h == host && s == share)
            .filter_map(|(_, _, path)| path.strip_prefix(dir.as_str()))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }

    /// Makes every connection attempt to `host` fail.
    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        toggle(&mut lock(&self.state).unreachable, host, unreachable);
    }

    /// Makes every write to `host` fail with an error.
    pub fn set_fail_writes(&self, host: &str, failing: bool) {
        toggle(&mut lock(&self.state).failing_writes, host, failing);
    }

    /// Makes writes to `host` report success without storing anything.
    pub fn set_lose_writes(&self, host: &str, losing: bool) {
        toggle(&mut lock(&self.state).lost_writes, host, losing);
    }

    /// Makes writes to `host` store the first half of the content and then
    /// fail, leaving a truncated file behind.
    pub fn set_interrupt_writes(&self, host: &str, interrupting: bool) {
        toggle(&mut lock(&self.state).interrupted_writes, host, interrupting);
    }

    /// Makes every delete on `host` fail.
    pub fn set_fail_deletes(&self, host: &str, failing: bool) {
        toggle(&mut lock(&self.state).failing_deletes, host, failing);
    }

    /// Number of sessions currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of file writes that reached a share.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }
}

fn toggle(set: &mut HashSet<String>, host: &str, on: bool) {
    if on {
        set.insert(host.to_string());
    } else {
        set.remove(host);
    }
}

impl ShareConnector for InMemoryShareConnector {
    fn connect(&self, host: &RemoteHost, _timeout: Duration) -> Result<Box<dyn ShareConnection>> {
        if lock(&self.state).unreachable.contains(host.address()) {
            return Err(Error::Connection {
                host: host.address().to_string(),
                cause: "host unreachable".to_string(),
            });
        }

        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.counters.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryConnection {
            host: host.address().to_string(),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    host: String,
    state: Arc<Mutex<MemoryState>>,
    counters: Arc<Counters>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::operation("share_session", "connection closed"));
        }
        Ok(())
    }
}

impl ShareConnection for MemoryConnection {
    fn list_path(
        &mut self,
        share: &str,
        path: &str,
        filter: EntryFilter,
        _timeout: Duration,
    ) -> Result<Vec<ShareEntry>> {
        self.ensure_open()?;
        let dir = dir_key(path);
        let state = lock(&self.state);

        if !state.dir_exists(&self.host, share, &dir) {
            return Err(Error::NotFound(format!("{share}:{dir}")));
        }

        let mut entries: BTreeMap<String, ShareEntry> = BTreeMap::new();

        for ((h, s, file_path), file) in &state.files {
            if h != &self.host || s != share {
                continue;
            }
            let Some(rest) = file_path.strip_prefix(dir.as_str()) else {
                continue;
            };
            match rest.split_once('/') {
                None => {
                    entries.insert(
                        rest.to_string(),
                        ShareEntry {
                            name: rest.to_string(),
                            is_directory: false,
                            last_modified: file.last_modified,
                            size: file.content.len() as u64,
                        },
                    );
                },
                Some((child, _)) => {
                    entries.entry(child.to_string()).or_insert_with(|| ShareEntry {
                        name: child.to_string(),
                        is_directory: true,
                        last_modified: file.last_modified,
                        size: 0,
                    });
                },
            }
        }

        for (h, s, dir_path) in &state.dirs {
            if h != &self.host || s != share {
                continue;
            }
            let Some(rest) = dir_path.strip_prefix(dir.as_str()) else {
                continue;
            };
            let Some(child) = rest.split('/').next().filter(|c| !c.is_empty()) else {
                continue;
            };
            entries.entry(child.to_string()).or_insert_with(|| ShareEntry {
                name: child.to_string(),
                is_directory: true,
                last_modified: DateTime::<Utc>::UNIX_EPOCH,
                size: 0,
            });
        }

        Ok(entries
            .into_values()
            .filter(|entry| filter == EntryFilter::All || !entry.is_directory)
            .collect())
    }

    fn get_attributes(&mut self, share: &str, path: &str) -> Result<FileAttributes> {
        self.ensure_open()?;
        let state = lock(&self.state);

        if let Some(file) = state.files.get(&key(&self.host, share, path)) {
            return Ok(FileAttributes {
                is_directory: false,
                last_modified: file.last_modified,
                size: file.content.len() as u64,
            });
        }

        if state.dir_exists(&self.host, share, &dir_key(path)) {
            return Ok(FileAttributes {
                is_directory: true,
                last_modified: DateTime::<Utc>::UNIX_EPOCH,
                size: 0,
            });
        }

        Err(Error::NotFound(format!("{share}:{path}")))
    }

    fn retrieve_file(&mut self, share: &str, path: &str, sink: &mut dyn Write) -> Result<u64> {
        self.ensure_open()?;
        let content = lock(&self.state)
            .files
            .get(&key(&self.host, share, path))
            .map(|file| file.content.clone())
            .ok_or_else(|| Error::NotFound(format!("{share}:{path}")))?;

        sink.write_all(&content)
            .map_err(|e| Error::operation("retrieve_file", e))?;
        Ok(content.len() as u64)
    }

    fn store_file_from_offset(
        &mut self,
        share: &str,
        path: &str,
        source: &mut dyn Read,
        offset: u64,
    ) -> Result<u64> {
        self.ensure_open()?;
        let mut buffer = Vec::new();
        source
            .read_to_end(&mut buffer)
            .map_err(|e| Error::operation("store_file", e))?;

        let mut state = lock(&self.state);
        if state.failing_writes.contains(&self.host) {
            return Err(Error::operation("store_file", "write rejected by host"));
        }
        if state.lost_writes.contains(&self.host) {
            return Ok(buffer.len() as u64);
        }

        let interrupted = state.interrupted_writes.contains(&self.host);
        if interrupted {
            buffer.truncate(buffer.len() / 2);
        }

        let start = usize::try_from(offset).map_err(|e| Error::operation("store_file", e))?;
        let entry = state
            .files
            .entry(key(&self.host, share, path))
            .or_insert_with(|| StoredFile {
                content: Vec::new(),
                last_modified: Utc::now(),
            });
        entry.content.truncate(start);
        entry.content.resize(start, 0);
        entry.content.extend_from_slice(&buffer);
        entry.last_modified = Utc::now();

        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        if interrupted {
            return Err(Error::operation("store_file", "connection reset during write"));
        }
        Ok(buffer.len() as u64)
    }

    fn delete_files(
        &mut self,
        share: &str,
        path: &str,
        delete_matching_folders: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if state.failing_deletes.contains(&self.host) {
            return Err(Error::operation("delete_files", "delete rejected by host"));
        }

        if state.files.remove(&key(&self.host, share, path)).is_some() {
            return Ok(());
        }

        if delete_matching_folders {
            let dir = dir_key(path);
            let host = self.host.clone();
            let before = state.files.len() + state.dirs.len();
            state
                .files
                .retain(|(h, s, p), _| !(h == &host && s == share && p.starts_with(&dir)));
            state
                .dirs
                .retain(|(h, s, p)| !(h == &host && s == share && p.starts_with(&dir)));
            if state.files.len() + state.dirs.len() < before {
                return Ok(());
            }
        }

        Err(Error::NotFound(format!("{share}:{path}")))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
