//! Failure-absorbing operations against one remote host.

use super::{ConnectionScope, EntryFilter, ShareConnector};
use crate::models::{RemoteDirectory, RemoteFile, RemoteHost};
use crate::{Error, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default timeout for opening a session (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;

/// Default timeout for a directory listing (seconds).
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 10;

/// Timeouts applied by a [`RemoteEndpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Timeout for opening a session.
    pub connect_timeout: Duration,
    /// Timeout for listing a directory.
    pub list_timeout: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            list_timeout: Duration::from_secs(DEFAULT_LIST_TIMEOUT_SECS),
        }
    }
}

impl EndpointSettings {
    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the listing timeout.
    #[must_use]
    pub const fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }
}

/// Result of listing a directory.
///
/// An empty directory and a host that could not be listed are distinct so
/// callers can decide which of them is worth aborting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// The directory holds at least one regular file.
    Files(Vec<RemoteFile>),
    /// The directory was listed and holds no regular files.
    Empty,
    /// The host or directory could not be listed.
    Unreachable(String),
}

impl Listing {
    /// Returns the listed files, or nothing for `Empty` and `Unreachable`.
    #[must_use]
    pub fn into_files(self) -> Vec<RemoteFile> {
        match self {
            Self::Files(files) => files,
            Self::Empty | Self::Unreachable(_) => Vec::new(),
        }
    }

    /// Returns `true` if the listing could not be obtained.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Result of copying one file to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The target already had the file; nothing was transferred.
    AlreadyPresent,
    /// The file was transferred and confirmed at the target.
    Copied {
        /// Bytes written to the target.
        bytes: u64,
    },
    /// The transfer failed or could not be confirmed.
    Failed {
        /// Why the copy failed.
        reason: String,
    },
}

impl CopyOutcome {
    /// Returns `true` if the file is known to be present at the target.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// File operations on one remote host.
///
/// Every operation opens its own session and closes it before returning.
#[derive(Clone)]
pub struct RemoteEndpoint {
    host: RemoteHost,
    connector: Arc<dyn ShareConnector>,
    settings: EndpointSettings,
}

impl RemoteEndpoint {
    /// Creates an endpoint for `host`.
    #[must_use]
    pub fn new(host: RemoteHost, connector: Arc<dyn ShareConnector>, settings: EndpointSettings) -> Self {
        Self {
            host,
            connector,
            settings,
        }
    }

    /// The host this endpoint talks to.
    #[must_use]
    pub const fn host(&self) -> &RemoteHost {
        &self.host
    }

    fn open(&self) -> Result<ConnectionScope> {
        ConnectionScope::open(self.connector.as_ref(), &self.host, self.settings.connect_timeout)
    }

    /// Lists the regular files of `directory`.
    #[instrument(skip(self), fields(host = %self.host.address(), directory = %directory))]
    pub fn list(&self, directory: &RemoteDirectory) -> Listing {
        let listed = self.open().and_then(|mut connection| {
            connection.list_path(
                directory.share(),
                directory.path(),
                EntryFilter::FilesOnly,
                self.settings.list_timeout,
            )
        });

        let entries = match listed {
            Ok(entries) => entries,
            Err(e) => {
                warn!(host = %self.host, directory = %directory, error = %e, "Failed to list directory");
                return Listing::Unreachable(e.to_string());
            },
        };

        let files: Vec<RemoteFile> = entries
            .into_iter()
            .filter(|entry| !entry.is_directory && entry.name != "." && entry.name != "..")
            .map(|entry| RemoteFile::new(entry.name, entry.last_modified).with_size(entry.size))
            .collect();

        debug!(count = files.len(), "Listed directory");

        if files.is_empty() {
            Listing::Empty
        } else {
            Listing::Files(files)
        }
    }

    /// Returns `true` if `file` exists in `directory`.
    pub fn exists(&self, file: &RemoteFile, directory: &RemoteDirectory) -> bool {
        let path = directory.file_path(&file.name);
        self.open()
            .and_then(|mut connection| connection.get_attributes(directory.share(), &path))
            .is_ok()
    }

    /// Copies `file` from `source_directory` on this host to
    /// `target_directory` on `target`.
    ///
    /// The content is staged in an anonymous temporary file that is removed
    /// when the copy returns, whatever the outcome. A write that fails
    /// partway has its partial file deleted from the target, best effort.
    #[instrument(
        skip(self, file, target),
        fields(
            file = %file.name,
            source_host = %self.host.address(),
            target_host = %target.host.address(),
            target_directory = %target_directory
        )
    )]
    pub fn copy(
        &self,
        file: &RemoteFile,
        source_directory: &RemoteDirectory,
        target: &Self,
        target_directory: &RemoteDirectory,
    ) -> CopyOutcome {
        if target.exists(file, target_directory) {
            debug!("File already present at target");
            return CopyOutcome::AlreadyPresent;
        }

        let mut staging = match self.stage(file, source_directory) {
            Ok(staging) => staging,
            Err(e) => {
                warn!(error = %e, "Copy failed while reading source");
                return CopyOutcome::Failed {
                    reason: e.to_string(),
                };
            },
        };

        let bytes = match target.store(file, target_directory, &mut staging) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Copy failed while writing target");
                // A cut-off write may leave a truncated file that a later run
                // would take for a finished copy.
                if target.exists(file, target_directory) && !target.delete(file, target_directory) {
                    warn!("Partial file left at target");
                }
                return CopyOutcome::Failed {
                    reason: e.to_string(),
                };
            },
        };

        if !target.exists(file, target_directory) {
            warn!("Copied file is not present at target");
            return CopyOutcome::Failed {
                reason: "file not present at target after transfer".to_string(),
            };
        }

        debug!(bytes, "File copied");
        CopyOutcome::Copied { bytes }
    }

    /// Reads `file` into a rewound anonymous staging file.
    fn stage(&self, file: &RemoteFile, directory: &RemoteDirectory) -> Result<File> {
        let mut staging =
            tempfile::tempfile().map_err(|e| Error::operation("create_staging_buffer", e))?;

        {
            let mut source = self.open()?;
            source.retrieve_file(directory.share(), &directory.file_path(&file.name), &mut staging)?;
        }

        staging
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::operation("rewind_staging_buffer", e))?;
        Ok(staging)
    }

    fn store(&self, file: &RemoteFile, directory: &RemoteDirectory, staging: &mut File) -> Result<u64> {
        let mut destination = self.open()?;
        destination.store_file_from_offset(
            directory.share(),
            &directory.file_path(&file.name),
            staging,
            0,
        )
    }

    /// Deletes `file` from `directory`. Returns `false` on any failure.
    pub fn delete(&self, file: &RemoteFile, directory: &RemoteDirectory) -> bool {
        let path = directory.file_path(&file.name);
        let result = self
            .open()
            .and_then(|mut connection| connection.delete_files(directory.share(), &path, false));

        match result {
            Ok(()) => {
                debug!(host = %self.host, path = %path, "Deleted file");
                true
            },
            Err(e) => {
                warn!(host = %self.host, path = %path, error = %e, "Failed to delete file");
                false
            },
        }
    }
}
