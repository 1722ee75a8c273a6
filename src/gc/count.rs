//! Count-based pruning.

use crate::models::{RemoteFile, TargetSpec};
use crate::remote::{Listing, RemoteEndpoint};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Selects the files to delete so that at most `max_retained_count` remain.
///
/// Files are ordered oldest first; files with equal timestamps keep their
/// listing order. Returns nothing when no limit is configured or the limit
/// is not exceeded.
#[must_use]
pub fn prune_targets(files: &[RemoteFile], max_retained_count: Option<usize>) -> Vec<RemoteFile> {
    let Some(limit) = max_retained_count else {
        return Vec::new();
    };

    let overflow = files.len().saturating_sub(limit);
    if overflow == 0 {
        return Vec::new();
    }

    let mut ordered = files.to_vec();
    ordered.sort_by_key(|file| file.last_modified);
    ordered.truncate(overflow);
    ordered
}

/// What happened to one target during pruning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneStatus {
    /// The target has no retained-count limit.
    Disabled,
    /// The target holds no more files than its limit.
    WithinLimit,
    /// Old files were (or, in a dry run, would be) deleted.
    Pruned,
    /// The target directory could not be listed; nothing was deleted.
    ListingFailed(String),
}

/// Result of pruning one target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Target description (`host share:path`).
    pub target: String,
    /// Overall status.
    pub status: PruneStatus,
    /// Files found in the target directory.
    pub files_checked: usize,
    /// Files deleted (or selected, in a dry run).
    pub deleted: Vec<String>,
    /// Files whose deletion failed.
    pub failed: Vec<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl PruneOutcome {
    fn new(target: String, status: PruneStatus, dry_run: bool) -> Self {
        Self {
            target,
            status,
            files_checked: 0,
            deleted: Vec::new(),
            failed: Vec::new(),
            dry_run,
            duration_ms: 0,
        }
    }

    /// Returns `true` if the pass hit a listing or delete failure.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        matches!(self.status, PruneStatus::ListingFailed(_)) || !self.failed.is_empty()
    }

    /// Returns a human-readable summary of the pass.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.status {
            PruneStatus::Disabled => format!("{}: pruning disabled", self.target),
            PruneStatus::WithinLimit => format!(
                "{}: {} files within limit ({}ms)",
                self.target, self.files_checked, self.duration_ms
            ),
            PruneStatus::ListingFailed(reason) => {
                format!("{}: listing failed, pruning skipped ({reason})", self.target)
            },
            PruneStatus::Pruned => {
                let action = if self.dry_run { "would delete" } else { "deleted" };
                let mut summary = format!(
                    "{}: {action} {} of {} files ({}ms)",
                    self.target,
                    self.deleted.len(),
                    self.files_checked,
                    self.duration_ms
                );
                if !self.failed.is_empty() {
                    summary.push_str(&format!(", {} deletes failed", self.failed.len()));
                }
                summary
            },
        }
    }
}

/// Applies [`prune_targets`] to a live target directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetPruner {
    dry_run: bool,
}

impl TargetPruner {
    /// Creates a pruner. With `dry_run`, files are selected but not deleted.
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Lists `target`, then deletes the files beyond its retained count.
    ///
    /// A listing failure is reported in the outcome and leaves the target
    /// untouched.
    #[instrument(
        name = "mirrorkeep.gc.prune",
        skip(self, endpoint, target),
        fields(
            component = "gc",
            target = %target.directory,
            max_retained = ?target.max_retained_count,
            dry_run = self.dry_run
        )
    )]
    pub fn prune(&self, endpoint: &RemoteEndpoint, target: &TargetSpec) -> PruneOutcome {
        let start = Instant::now();
        let label = format!("{} {}", endpoint.host().address(), target.directory);

        if target.max_retained_count.is_none() {
            debug!("No retained-count limit, skipping target");
            return PruneOutcome::new(label, PruneStatus::Disabled, self.dry_run);
        }

        let files = match endpoint.list(&target.directory) {
            Listing::Files(files) => files,
            Listing::Empty => Vec::new(),
            Listing::Unreachable(reason) => {
                warn!(reason = %reason, "Target listing failed, pruning skipped");
                let mut outcome =
                    PruneOutcome::new(label, PruneStatus::ListingFailed(reason), self.dry_run);
                outcome.duration_ms = duration_to_millis(start.elapsed());
                return outcome;
            },
        };

        let doomed = prune_targets(&files, target.max_retained_count);
        let mut outcome = PruneOutcome::new(label, PruneStatus::WithinLimit, self.dry_run);
        outcome.files_checked = files.len();

        if !doomed.is_empty() {
            outcome.status = PruneStatus::Pruned;
        }

        for file in doomed {
            if self.dry_run || endpoint.delete(&file, &target.directory) {
                outcome.deleted.push(file.name);
            } else {
                outcome.failed.push(file.name);
            }
        }

        outcome.duration_ms = duration_to_millis(start.elapsed());

        if !self.dry_run {
            metrics::counter!("mirror_pruned_files_total").increment(outcome.deleted.len() as u64);
        }

        info!(
            files_checked = outcome.files_checked,
            deleted = outcome.deleted.len(),
            failed = outcome.failed.len(),
            duration_ms = outcome.duration_ms,
            "Target pruning completed"
        );

        outcome
    }
}
