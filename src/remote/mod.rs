//! Remote file-share access.
//!
//! The share protocol itself lives behind two traits:
//!
//! - [`ShareConnector`] opens a session to a [`RemoteHost`]
//! - [`ShareConnection`] is that session: list, stat, read, write, delete
//!
//! [`RemoteEndpoint`] builds the operations the engine needs on top of them
//! and never lets a protocol error escape: listings become a [`Listing`],
//! copies a [`CopyOutcome`], deletes a `bool`.
//!
//! # Connection lifetime
//!
//! No session outlives the operation that opened it. [`ConnectionScope`]
//! closes the session when dropped, so every early return closes it too.
//!
//! ```text
//!   RemoteEndpoint::copy
//!     ├─ ConnectionScope(target) ── get_attributes ── drop → close
//!     ├─ ConnectionScope(source) ── retrieve_file ─── drop → close
//!     ├─ ConnectionScope(target) ── store_file ────── drop → close
//!     └─ ConnectionScope(target) ── get_attributes ── drop → close
//! ```

mod endpoint;
mod memory;
mod mounted;

pub use endpoint::{CopyOutcome, EndpointSettings, Listing, RemoteEndpoint};
pub use memory::InMemoryShareConnector;
pub use mounted::{MountPoint, MountedShareConnector};

use crate::Result;
use crate::models::RemoteHost;
use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Which entries a directory listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFilter {
    /// Files and directories.
    #[default]
    All,
    /// Regular files only.
    FilesOnly,
}

/// A raw directory entry as returned by the share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEntry {
    /// Entry name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Last write time.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

/// Metadata of a single remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    /// Whether the path is a directory.
    pub is_directory: bool,
    /// Last write time.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

/// An open session to one remote host.
///
/// Paths are absolute within `share` and use `/` separators.
pub trait ShareConnection {
    /// Lists the entries of a directory.
    ///
    /// Implementations skip the `.` and `..` pseudo entries.
    fn list_path(
        &mut self,
        share: &str,
        path: &str,
        filter: EntryFilter,
        timeout: Duration,
    ) -> Result<Vec<ShareEntry>>;

    /// Returns metadata for a path.
    fn get_attributes(&mut self, share: &str, path: &str) -> Result<FileAttributes>;

    /// Streams a remote file into `sink`, returning the bytes read.
    fn retrieve_file(&mut self, share: &str, path: &str, sink: &mut dyn Write) -> Result<u64>;

    /// Writes `source` into a remote file starting at `offset`, creating the
    /// file if needed. Returns the bytes written.
    fn store_file_from_offset(
        &mut self,
        share: &str,
        path: &str,
        source: &mut dyn Read,
        offset: u64,
    ) -> Result<u64>;

    /// Deletes a file. With `delete_matching_folders`, a directory at `path`
    /// is removed as well.
    fn delete_files(&mut self, share: &str, path: &str, delete_matching_folders: bool)
    -> Result<()>;

    /// Ends the session. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens sessions to remote hosts.
pub trait ShareConnector: Send + Sync {
    /// Connects to `host`, giving up after `timeout`.
    fn connect(&self, host: &RemoteHost, timeout: Duration) -> Result<Box<dyn ShareConnection>>;
}

/// A session that is closed when the scope ends.
pub struct ConnectionScope {
    connection: Box<dyn ShareConnection>,
}

impl ConnectionScope {
    /// Opens a session through `connector`.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the host cannot be reached.
    pub fn open(
        connector: &dyn ShareConnector,
        host: &RemoteHost,
        timeout: Duration,
    ) -> Result<Self> {
        let connection = connector.connect(host, timeout)?;
        Ok(Self { connection })
    }
}

impl Deref for ConnectionScope {
    type Target = dyn ShareConnection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl DerefMut for ConnectionScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut()
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        self.connection.close();
    }
}
