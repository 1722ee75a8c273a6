//! Data models for mirrorkeep.
//!
//! Hosts, directories and listing entries describe where files live; policies
//! describe what happens to them.

mod file;
mod host;
mod policy;

pub use file::RemoteFile;
pub use host::{RemoteDirectory, RemoteHost};
pub use policy::{ArchiveMethod, MirrorPolicy, RetentionRule, TargetSpec};
