//! Remote host and directory addressing.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Connection identity for a remote file-share host.
///
/// The share protocol handshake needs both the remote and the local machine
/// names in addition to the network address and credentials.
#[derive(Debug, Clone)]
pub struct RemoteHost {
    address: String,
    machine_name: String,
    username: String,
    password: SecretString,
    local_name: String,
}

impl RemoteHost {
    /// Creates a host identity.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        machine_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            machine_name: machine_name.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            local_name: local_name.into(),
        }
    }

    /// Network address of the host.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Remote machine name.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// Login user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Name of the initiating local machine.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.machine_name, self.address)
    }
}

/// A directory on a remote share.
///
/// The path is always stored with a leading and a trailing `/` so that
/// [`RemoteDirectory::file_path`] can append a file name directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteDirectory {
    share: String,
    path: String,
}

impl RemoteDirectory {
    /// Creates a directory reference, normalizing separators.
    ///
    /// Backslashes are converted to `/`, repeated separators collapsed and
    /// the path is made `/`-terminated.
    #[must_use]
    pub fn new(share: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            share: share.into(),
            path: normalize_dir_path(path.as_ref()),
        }
    }

    /// Share name.
    #[must_use]
    pub fn share(&self) -> &str {
        &self.share
    }

    /// Path within the share, `/`-terminated.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full path of `file_name` inside this directory.
    #[must_use]
    pub fn file_path(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.path)
    }
}

impl fmt::Display for RemoteDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.share, self.path)
    }
}

fn normalize_dir_path(raw: &str) -> String {
    let segments: Vec<&str> = raw
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}/", segments.join("/"))
}
