//! Listing entries.

use chrono::{DateTime, Utc};

/// A regular file as reported by a directory listing.
///
/// Entries are compared by name; two entries from the same listing never
/// share a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name without any directory component.
    pub name: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes, when the listing reports it.
    pub size: u64,
}

impl RemoteFile {
    /// Creates a listing entry.
    #[must_use]
    pub fn new(name: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_modified,
            size: 0,
        }
    }

    /// Sets the reported size.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}
