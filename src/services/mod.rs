//! Business logic services.
//!
//! Services turn policies into remote operations: admission decides which
//! source files qualify, the engine moves them and reports what happened.

mod admission;
mod mirror;
mod report;

pub use admission::admits;
pub use mirror::{ActualizeMirrorer, EngineSettings, MirrorEngine, Mirrorer};
pub use report::{FileOutcome, PolicyReport, PolicyStatus, RunReport};
