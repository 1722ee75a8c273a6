//! Garbage collection of target directories.
//!
//! Targets are pruned by count, not by age: once a target directory holds
//! more files than its `max_retained_count`, the oldest ones are deleted
//! until the limit is met. The source [`RetentionRule`](crate::RetentionRule)
//! plays no part in this decision.
//!
//! # Example
//!
//! ```rust,ignore
//! use mirrorkeep::gc::TargetPruner;
//!
//! // Dry run to see what would be removed
//! let outcome = TargetPruner::new(true).prune(&endpoint, &target);
//! println!("{}", outcome.summary());
//!
//! // Actually delete
//! let outcome = TargetPruner::new(false).prune(&endpoint, &target);
//! ```

mod count;

pub use count::{PruneOutcome, PruneStatus, TargetPruner, prune_targets};
