//! Share connector backed by locally mounted shares.
//!
//! Each `(host, share)` pair is mapped to a directory where the share is
//! mounted (for example through `mount -t cifs`). Hosts without a mapping are
//! treated as unreachable.
//!
//! # Security
//!
//! Remote paths containing `..` are rejected so that a policy cannot escape
//! its mount point.
//!
//! # Timeouts
//!
//! A hung network mount blocks `stat` and `readdir` indefinitely. Connecting
//! stats the host's mount points and listing reads the directory on a worker
//! thread; the caller gives up after the connect or list timeout. A worker
//! stuck on a dead mount is left behind, since a blocked syscall cannot be
//! cancelled.

use super::{EntryFilter, FileAttributes, ShareConnection, ShareConnector, ShareEntry};
use crate::models::RemoteHost;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Where a remote share is mounted locally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountPoint {
    /// Host address as used in policies.
    pub host: String,
    /// Share name.
    pub share: String,
    /// Local mount directory.
    pub path: PathBuf,
}

/// Connector that serves shares from local mount points.
#[derive(Debug, Clone, Default)]
pub struct MountedShareConnector {
    mounts: Vec<MountPoint>,
}

impl MountedShareConnector {
    /// Creates a connector from a mount table.
    #[must_use]
    pub const fn new(mounts: Vec<MountPoint>) -> Self {
        Self { mounts }
    }

    /// The configured mount table.
    #[must_use]
    pub fn mounts(&self) -> &[MountPoint] {
        &self.mounts
    }
}

impl ShareConnector for MountedShareConnector {
    fn connect(&self, host: &RemoteHost, timeout: Duration) -> Result<Box<dyn ShareConnection>> {
        let mounts: Vec<MountPoint> = self
            .mounts
            .iter()
            .filter(|mount| mount.host == host.address())
            .cloned()
            .collect();

        if mounts.is_empty() {
            return Err(Error::Connection {
                host: host.address().to_string(),
                cause: "no mount configured for host".to_string(),
            });
        }

        let paths: Vec<PathBuf> = mounts.iter().map(|mount| mount.path.clone()).collect();
        run_bounded(host.address(), "connect", timeout, move || {
            for path in &paths {
                // Only the round trip matters here; a missing mount point is
                // reported by the operation that needs it.
                let _ = fs::metadata(path);
            }
            Ok(())
        })?;

        Ok(Box::new(MountedConnection {
            host: host.address().to_string(),
            mounts,
        }))
    }
}

struct MountedConnection {
    host: String,
    mounts: Vec<MountPoint>,
}

impl MountedConnection {
    fn resolve(&self, share: &str, path: &str) -> Result<PathBuf> {
        let mount = self
            .mounts
            .iter()
            .find(|mount| mount.share == share)
            .ok_or_else(|| Error::Connection {
                host: self.host.clone(),
                cause: format!("share '{share}' is not mounted"),
            })?;

        if !mount.path.is_dir() {
            return Err(Error::Connection {
                host: self.host.clone(),
                cause: format!("mount point {} is not available", mount.path.display()),
            });
        }

        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {},
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "unsafe remote path '{path}' on share '{share}'"
                    )));
                },
            }
        }

        Ok(mount.path.join(relative))
    }
}

fn io_error(operation: &str, path: &Path, e: &io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        return Error::NotFound(path.display().to_string());
    }
    Error::operation(operation, format!("{}: {e}", path.display()))
}

fn modified_time(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map_or(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::from)
}

/// Runs `work` on a worker thread and waits at most `timeout` for it.
fn run_bounded<T, F>(host: &str, operation: &str, timeout: Duration, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the caller has timed out.
        let _ = tx.send(work());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            metrics::counter!("mirror_mount_timeouts_total", "operation" => operation.to_string())
                .increment(1);
            Err(Error::Connection {
                host: host.to_string(),
                cause: format!("{operation} timed out after {}s", timeout.as_secs_f64()),
            })
        },
        Err(RecvTimeoutError::Disconnected) => Err(Error::operation(
            operation,
            "worker thread exited without a result",
        )),
    }
}

fn read_entries(dir: &Path, filter: EntryFilter) -> Result<Vec<ShareEntry>> {
    let reader = fs::read_dir(dir).map_err(|e| io_error("list_path", dir, &e))?;

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| io_error("list_path", dir, &e))?;
        let metadata = entry
            .metadata()
            .map_err(|e| io_error("list_path", &entry.path(), &e))?;

        let is_directory = metadata.is_dir();
        if filter == EntryFilter::FilesOnly && !metadata.is_file() {
            continue;
        }

        entries.push(ShareEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_directory,
            last_modified: modified_time(&metadata),
            size: metadata.len(),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

impl ShareConnection for MountedConnection {
    fn list_path(
        &mut self,
        share: &str,
        path: &str,
        filter: EntryFilter,
        timeout: Duration,
    ) -> Result<Vec<ShareEntry>> {
        let dir = self.resolve(share, path)?;
        run_bounded(&self.host, "list_path", timeout, move || read_entries(&dir, filter))
    }

    fn get_attributes(&mut self, share: &str, path: &str) -> Result<FileAttributes> {
        let local = self.resolve(share, path)?;
        let metadata = fs::metadata(&local).map_err(|e| io_error("get_attributes", &local, &e))?;

        Ok(FileAttributes {
            is_directory: metadata.is_dir(),
            last_modified: modified_time(&metadata),
            size: metadata.len(),
        })
    }

    fn retrieve_file(&mut self, share: &str, path: &str, sink: &mut dyn Write) -> Result<u64> {
        let local = self.resolve(share, path)?;
        let mut file = File::open(&local).map_err(|e| io_error("retrieve_file", &local, &e))?;
        io::copy(&mut file, sink).map_err(|e| io_error("retrieve_file", &local, &e))
    }

    fn store_file_from_offset(
        &mut self,
        share: &str,
        path: &str,
        source: &mut dyn Read,
        offset: u64,
    ) -> Result<u64> {
        let local = self.resolve(share, path)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&local)
            .map_err(|e| io_error("store_file", &local, &e))?;

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| io_error("store_file", &local, &e))?;
        let written = io::copy(source, &mut file).map_err(|e| io_error("store_file", &local, &e))?;
        file.set_len(offset + written)
            .map_err(|e| io_error("store_file", &local, &e))?;
        file.sync_all()
            .map_err(|e| io_error("store_file", &local, &e))?;

        Ok(written)
    }

    fn delete_files(
        &mut self,
        share: &str,
        path: &str,
        delete_matching_folders: bool,
    ) -> Result<()> {
        let local = self.resolve(share, path)?;
        let metadata =
            fs::symlink_metadata(&local).map_err(|e| io_error("delete_files", &local, &e))?;

        if metadata.is_dir() {
            if !delete_matching_folders {
                return Err(Error::InvalidInput(format!(
                    "'{path}' on share '{share}' is a directory"
                )));
            }
            return fs::remove_dir_all(&local).map_err(|e| io_error("delete_files", &local, &e));
        }

        fs::remove_file(&local).map_err(|e| io_error("delete_files", &local, &e))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host() -> RemoteHost {
        RemoteHost::new("192.168.0.1", "server", "admin", "pw", "local")
    }

    fn connector(root: &TempDir) -> MountedShareConnector {
        MountedShareConnector::new(vec![MountPoint {
            host: "192.168.0.1".to_string(),
            share: "data".to_string(),
            path: root.path().to_path_buf(),
        }])
    }

    #[test]
    fn test_unknown_host_is_unreachable() {
        let root = TempDir::new().expect("tempdir");
        let other = RemoteHost::new("10.9.9.9", "x", "u", "p", "l");
        assert!(matches!(
            connector(&root).connect(&other, Duration::from_secs(1)),
            Err(Error::Connection { .. })
        ));
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let root = TempDir::new().expect("tempdir");
        let mut conn = connector(&root)
            .connect(&host(), Duration::from_secs(1))
            .expect("connect");
        assert!(matches!(
            conn.get_attributes("data", "/../etc/passwd"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unmounted_share_fails() {
        let root = TempDir::new().expect("tempdir");
        let mut conn = connector(&root)
            .connect(&host(), Duration::from_secs(1))
            .expect("connect");
        assert!(conn
            .list_path("other", "/", EntryFilter::All, Duration::from_secs(1))
            .is_err());
    }

    #[test]
    fn test_store_list_delete() {
        let root = TempDir::new().expect("tempdir");
        fs::create_dir(root.path().join("out")).expect("mkdir");
        fs::create_dir(root.path().join("out").join("nested")).expect("mkdir");
        let mut conn = connector(&root)
            .connect(&host(), Duration::from_secs(1))
            .expect("connect");

        let mut source: &[u8] = b"archive-bytes";
        let written = conn
            .store_file_from_offset("data", "/out/a.zip", &mut source, 0)
            .expect("store");
        assert_eq!(written, 13);

        let files = conn
            .list_path("data", "/out/", EntryFilter::FilesOnly, Duration::from_secs(1))
            .expect("list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.zip");
        assert_eq!(files[0].size, 13);

        let mut out = Vec::new();
        conn.retrieve_file("data", "/out/a.zip", &mut out)
            .expect("retrieve");
        assert_eq!(out, b"archive-bytes");

        conn.delete_files("data", "/out/a.zip", false).expect("delete");
        assert!(matches!(
            conn.get_attributes("data", "/out/a.zip"),
            Err(Error::NotFound(_))
        ));
        assert!(conn.delete_files("data", "/out/nested", false).is_err());
    }

    #[test]
    fn test_store_truncates_previous_content() {
        let root = TempDir::new().expect("tempdir");
        fs::write(root.path().join("f.txt"), b"longer old content").expect("write");
        let mut conn = connector(&root)
            .connect(&host(), Duration::from_secs(1))
            .expect("connect");

        let mut source: &[u8] = b"new";
        conn.store_file_from_offset("data", "/f.txt", &mut source, 0)
            .expect("store");

        assert_eq!(fs::read(root.path().join("f.txt")).expect("read"), b"new");
    }

    #[test]
    fn test_run_bounded_gives_up_after_timeout() {
        let result: Result<()> = run_bounded("192.168.0.1", "list_path", Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert!(matches!(
            result,
            Err(Error::Connection { ref host, ref cause })
                if host == "192.168.0.1" && cause.contains("timed out")
        ));
    }

    #[test]
    fn test_run_bounded_passes_through_results() {
        let ok: Result<u8> = run_bounded("h", "connect", Duration::from_secs(5), || Ok(7));
        assert_eq!(ok.expect("value"), 7);

        let err: Result<u8> = run_bounded("h", "connect", Duration::from_secs(5), || {
            Err(Error::NotFound("x".to_string()))
        });
        assert!(matches!(err, Err(Error::NotFound(_))));
    }
}
