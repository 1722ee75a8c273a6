//! # Mirrorkeep
//!
//! Policy-driven file retention and mirroring for remote file shares.
//!
//! For every configured policy, mirrorkeep inspects a source directory on a
//! remote share, admits files by age, copies them to one or more target
//! directories, optionally removes the source copy and finally prunes every
//! target down to a maximum number of retained files.
//!
//! ## Layers
//!
//! - [`remote`]: share connectors and the [`RemoteEndpoint`] wrapper
//! - [`services`]: the retention evaluator and the [`MirrorEngine`]
//! - [`gc`]: count-based pruning of target directories
//! - [`config`]: settings and YAML policy loading
//! - [`observability`]: logging and metrics setup
//!
//! ## Example
//!
//! ```rust,ignore
//! use mirrorkeep::{MirrorEngine, EngineSettings};
//! use mirrorkeep::remote::MountedShareConnector;
//! use std::sync::Arc;
//!
//! let connector = Arc::new(MountedShareConnector::new(config.mounts.clone()));
//! let engine = MirrorEngine::new(connector, EngineSettings::default());
//! let report = engine.run(&policies);
//! println!("{}", report.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod gc;
pub mod models;
pub mod observability;
pub mod remote;
pub mod services;

pub use config::{MirrorkeepConfig, load_policies};
pub use gc::{PruneOutcome, TargetPruner, prune_targets};
pub use models::{
    ArchiveMethod, MirrorPolicy, RemoteDirectory, RemoteFile, RemoteHost, RetentionRule,
    TargetSpec,
};
pub use remote::{CopyOutcome, Listing, RemoteEndpoint, ShareConnection, ShareConnector};
pub use services::{
    ActualizeMirrorer, EngineSettings, FileOutcome, MirrorEngine, Mirrorer, PolicyReport,
    PolicyStatus, RunReport, admits,
};

/// Error type for mirrorkeep operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed policy files, policies without targets, unsafe paths |
/// | `OperationFailed` | I/O errors on settings, log files, shares or staging buffers |
/// | `Connection` | A share host cannot be reached or rejects the session |
/// | `NotFound` | A remote file or directory does not exist |
///
/// None of these cross the [`RemoteEndpoint`] boundary: the endpoint turns
/// them into outcomes and the engine keeps going.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Connecting to a remote host failed.
    ///
    /// Raised when:
    /// - the host is unknown to the connector or unreachable
    /// - authentication is rejected
    /// - the connect timeout elapses
    #[error("connection to '{host}' failed: {cause}")]
    Connection {
        /// Address of the host.
        host: String,
        /// The underlying cause.
        cause: String,
    },

    /// A remote path does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for mirrorkeep operations.
pub type Result<T> = std::result::Result<T, Error>;
