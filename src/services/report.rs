//! Run, policy and file outcomes.

use crate::gc::PruneOutcome;
use crate::models::{ArchiveMethod, MirrorPolicy};

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file did not meet the retention rule.
    Skipped {
        /// File name.
        name: String,
    },
    /// The file reached every target; the rule keeps the source copy.
    Copied {
        /// File name.
        name: String,
    },
    /// The file reached every target and the source copy was deleted.
    Archived {
        /// File name.
        name: String,
    },
    /// Dry run: the file would have been copied.
    Planned {
        /// File name.
        name: String,
        /// Whether the source copy would have been deleted.
        delete_source: bool,
    },
    /// The file was left untouched at the source.
    Failed {
        /// File name.
        name: String,
        /// Why processing stopped.
        reason: String,
    },
}

impl FileOutcome {
    /// File name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Skipped { name }
            | Self::Copied { name }
            | Self::Archived { name }
            | Self::Planned { name, .. }
            | Self::Failed { name, .. } => name,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Copied { .. } => "copied",
            Self::Archived { .. } => "archived",
            Self::Planned { .. } => "planned",
            Self::Failed { .. } => "failed",
        }
    }

    /// Returns `true` if the file was processed successfully.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        matches!(self, Self::Copied { .. } | Self::Archived { .. })
    }
}

/// Terminal state of one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyStatus {
    /// All files were evaluated and every target was visited for pruning.
    Completed,
    /// The policy stopped before processing any file.
    Aborted {
        /// Why the policy stopped.
        reason: String,
    },
    /// No mirrorer implements the policy's method.
    Unsupported,
}

impl PolicyStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted { .. } => "aborted",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Result of running one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyReport {
    /// Policy name.
    pub name: String,
    /// Archival method.
    pub method: ArchiveMethod,
    /// Terminal state.
    pub status: PolicyStatus,
    /// One outcome per listed source file, in listing order.
    pub files: Vec<FileOutcome>,
    /// One outcome per target, in configured order.
    pub prunes: Vec<PruneOutcome>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl PolicyReport {
    /// Creates an empty, completed report for `policy`.
    #[must_use]
    pub fn new(policy: &MirrorPolicy) -> Self {
        Self {
            name: policy.name().to_string(),
            method: policy.method(),
            status: PolicyStatus::Completed,
            files: Vec::new(),
            prunes: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Creates a report for a policy that stopped before processing files.
    #[must_use]
    pub fn aborted(policy: &MirrorPolicy, reason: impl Into<String>) -> Self {
        Self {
            status: PolicyStatus::Aborted {
                reason: reason.into(),
            },
            ..Self::new(policy)
        }
    }

    /// Creates a report for a policy no mirrorer can handle.
    #[must_use]
    pub fn unsupported(policy: &MirrorPolicy) -> Self {
        Self {
            status: PolicyStatus::Unsupported,
            ..Self::new(policy)
        }
    }

    /// Number of files with the given outcome label.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.files.iter().filter(|f| f.label() == label).count()
    }

    /// Returns `true` if the policy did not complete or anything in it failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.status != PolicyStatus::Completed
            || self.files.iter().any(|f| matches!(f, FileOutcome::Failed { .. }))
            || self.prunes.iter().any(PruneOutcome::has_failures)
    }

    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.status {
            PolicyStatus::Aborted { reason } => format!("{}: aborted ({reason})", self.name),
            PolicyStatus::Unsupported => {
                format!("{}: method '{}' not supported, skipped", self.name, self.method)
            },
            PolicyStatus::Completed => {
                let pruned: usize = self.prunes.iter().map(|p| p.deleted.len()).sum();
                format!(
                    "{}: {} files, {} archived, {} copied, {} planned, {} skipped, {} failed, {} pruned ({}ms)",
                    self.name,
                    self.files.len(),
                    self.count("archived"),
                    self.count("copied"),
                    self.count("planned"),
                    self.count("skipped"),
                    self.count("failed"),
                    pruned,
                    self.duration_ms
                )
            },
        }
    }
}

/// Result of running a policy set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One report per policy, in input order.
    pub policies: Vec<PolicyReport>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    /// Returns `true` if every policy completed without failures.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.policies.iter().any(PolicyReport::has_failures)
    }

    /// Looks up the first policy report with `name`.
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<&PolicyReport> {
        self.policies.iter().find(|p| p.name == name)
    }

    /// Returns a multi-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let failed = self.policies.iter().filter(|p| p.has_failures()).count();
        let mut lines = vec![format!(
            "{} {} policies in {}ms, {} with failures",
            if self.dry_run { "Planned" } else { "Ran" },
            self.policies.len(),
            self.duration_ms,
            failed
        )];
        lines.extend(self.policies.iter().map(|p| format!("  {}", p.summary())));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::PruneStatus;
    use crate::models::{RemoteDirectory, RemoteHost, RetentionRule, TargetSpec};

    fn policy() -> MirrorPolicy {
        let host = RemoteHost::new("h", "m", "u", "p", "l");
        MirrorPolicy::new(
            "accounting",
            host.clone(),
            RemoteDirectory::new("i", "/src/"),
            RetentionRule::new(31, true),
            vec![TargetSpec::new(host, RemoteDirectory::new("h", "/dst/"))],
        )
        .expect("policy")
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let mut report = PolicyReport::new(&policy());
        report.files = vec![
            FileOutcome::Archived { name: "a".into() },
            FileOutcome::Skipped { name: "b".into() },
            FileOutcome::Failed {
                name: "c".into(),
                reason: "copy failed".into(),
            },
        ];

        let summary = report.summary();
        assert!(summary.contains("3 files"));
        assert!(summary.contains("1 archived"));
        assert!(summary.contains("1 failed"));
        assert!(report.has_failures());
    }

    #[test]
    fn test_aborted_policy_is_failure() {
        let report = PolicyReport::aborted(&policy(), "source directory is empty");
        assert!(report.has_failures());
        assert!(report.summary().contains("aborted (source directory is empty)"));
    }

    #[test]
    fn test_prune_failure_marks_policy() {
        let mut report = PolicyReport::new(&policy());
        report.prunes.push(PruneOutcome {
            target: "h h:/dst/".into(),
            status: PruneStatus::ListingFailed("timeout".into()),
            files_checked: 0,
            deleted: Vec::new(),
            failed: Vec::new(),
            dry_run: false,
            duration_ms: 0,
        });
        assert!(report.has_failures());
    }

    #[test]
    fn test_run_report_success() {
        let mut run = RunReport::default();
        run.policies.push(PolicyReport::new(&policy()));
        assert!(run.is_success());
        assert!(run.policy("accounting").is_some());
        assert!(run.summary().starts_with("Ran 1 policies"));

        run.policies.push(PolicyReport::unsupported(&policy()));
        assert!(!run.is_success());
    }
}
