//! Policy execution.
//!
//! A policy moves through four steps: list the source directory, admit files
//! by age, copy each admitted file to every target (removing the source copy
//! when every target has it and the rule asks for it), then prune every target
//! down to its retained count.
//!
//! Failures never cross a policy boundary. A file that could not reach every
//! target stays at the source and is retried on the next run.

use super::admission::admits;
use super::report::{FileOutcome, PolicyReport, PolicyStatus, RunReport};
use crate::gc::TargetPruner;
use crate::models::{ArchiveMethod, MirrorPolicy, RemoteFile, RemoteHost, TargetSpec};
use crate::remote::{CopyOutcome, EndpointSettings, Listing, RemoteEndpoint, ShareConnector};
use chrono::{DateTime, FixedOffset, Local};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{Span, debug, info, info_span, instrument, warn};

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Timeouts for every remote operation.
    pub endpoint: EndpointSettings,
    /// How many targets of one file are copied concurrently.
    pub max_parallel_targets: usize,
    /// Evaluate admission and pruning without copying or deleting.
    pub dry_run: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            max_parallel_targets: 1,
            dry_run: false,
        }
    }
}

impl EngineSettings {
    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the number of concurrent target copies. Zero is treated as one.
    #[must_use]
    pub const fn with_max_parallel_targets(mut self, count: usize) -> Self {
        self.max_parallel_targets = count;
        self
    }
}

/// An archival strategy.
pub trait Mirrorer: Send + Sync {
    /// The policy method this strategy implements.
    fn method(&self) -> ArchiveMethod;

    /// Runs one policy to completion. Never fails: problems are recorded in
    /// the returned report.
    fn mirror(&self, policy: &MirrorPolicy, now: &DateTime<FixedOffset>) -> PolicyReport;
}

/// Age-based archival ([`ArchiveMethod::Actualize`]).
pub struct ActualizeMirrorer {
    connector: Arc<dyn ShareConnector>,
    settings: EngineSettings,
}

impl ActualizeMirrorer {
    /// Creates the mirrorer.
    #[must_use]
    pub fn new(connector: Arc<dyn ShareConnector>, settings: EngineSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    fn endpoint(&self, host: &RemoteHost) -> RemoteEndpoint {
        RemoteEndpoint::new(
            host.clone(),
            Arc::clone(&self.connector),
            self.settings.endpoint,
        )
    }

    fn process_file(
        &self,
        policy: &MirrorPolicy,
        source: &RemoteEndpoint,
        targets: &[(&TargetSpec, RemoteEndpoint)],
        file: RemoteFile,
        now: &DateTime<FixedOffset>,
    ) -> FileOutcome {
        let rule = policy.rule();
        let admitted = admits(&file, now, rule.max_age_days);
        debug!(
            file = %file.name,
            last_modified = %file.last_modified,
            max_age_days = rule.max_age_days,
            admitted,
            "Admission decision"
        );

        if !admitted {
            return FileOutcome::Skipped { name: file.name };
        }

        if self.settings.dry_run {
            return FileOutcome::Planned {
                name: file.name,
                delete_source: rule.delete_source,
            };
        }

        let failures: Vec<String> = self
            .copy_to_targets(policy, source, targets, &file)
            .into_iter()
            .zip(targets)
            .filter_map(|(outcome, (spec, endpoint))| match outcome {
                CopyOutcome::Copied { bytes } => {
                    metrics::counter!("mirror_copy_bytes_total").increment(bytes);
                    None
                },
                CopyOutcome::AlreadyPresent => None,
                CopyOutcome::Failed { reason } => Some(format!(
                    "{} {}: {reason}",
                    endpoint.host().address(),
                    spec.directory
                )),
            })
            .collect();

        if !failures.is_empty() {
            return FileOutcome::Failed {
                name: file.name,
                reason: format!("copy failed on {} target(s): {}", failures.len(), failures.join("; ")),
            };
        }

        if !rule.delete_source {
            return FileOutcome::Copied { name: file.name };
        }

        if source.delete(&file, policy.source_directory()) {
            FileOutcome::Archived { name: file.name }
        } else {
            FileOutcome::Failed {
                name: file.name,
                reason: "copied to all targets but source delete failed".to_string(),
            }
        }
    }

    /// Copies `file` to every target, returning one outcome per target in
    /// target order.
    fn copy_to_targets(
        &self,
        policy: &MirrorPolicy,
        source: &RemoteEndpoint,
        targets: &[(&TargetSpec, RemoteEndpoint)],
        file: &RemoteFile,
    ) -> Vec<CopyOutcome> {
        let source_directory = policy.source_directory();
        let width = self.settings.max_parallel_targets.max(1);

        if width == 1 {
            return targets
                .iter()
                .map(|(spec, endpoint)| source.copy(file, source_directory, endpoint, &spec.directory))
                .collect();
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        for chunk in targets.chunks(width) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|(spec, endpoint)| {
                        let span = Span::current();
                        scope.spawn(move || {
                            let _entered = span.enter();
                            source.copy(file, source_directory, endpoint, &spec.directory)
                        })
                    })
                    .collect();

                for handle in handles {
                    outcomes.push(handle.join().unwrap_or_else(|_| CopyOutcome::Failed {
                        reason: "copy worker panicked".to_string(),
                    }));
                }
            });
        }
        outcomes
    }
}

impl Mirrorer for ActualizeMirrorer {
    fn method(&self) -> ArchiveMethod {
        ArchiveMethod::Actualize
    }

    #[instrument(
        name = "mirrorkeep.mirror.actualize",
        skip(self, policy, now),
        fields(
            source = %policy.source_directory(),
            targets = policy.targets().len(),
            dry_run = self.settings.dry_run
        )
    )]
    fn mirror(&self, policy: &MirrorPolicy, now: &DateTime<FixedOffset>) -> PolicyReport {
        let start = Instant::now();
        let source = self.endpoint(policy.source_host());

        let files = match source.list(policy.source_directory()) {
            Listing::Files(files) => files,
            Listing::Empty => {
                warn!(host = %source.host(), "Source directory is empty, policy aborted");
                return PolicyReport::aborted(policy, "source directory is empty");
            },
            Listing::Unreachable(reason) => {
                warn!(host = %source.host(), reason = %reason, "Source directory unreachable, policy aborted");
                return PolicyReport::aborted(policy, format!("source unreachable: {reason}"));
            },
        };

        let targets: Vec<(&TargetSpec, RemoteEndpoint)> = policy
            .targets()
            .iter()
            .map(|spec| (spec, self.endpoint(&spec.host)))
            .collect();

        let mut report = PolicyReport::new(policy);
        for file in files {
            let outcome = self.process_file(policy, &source, &targets, file, now);
            match &outcome {
                FileOutcome::Failed { name, reason } => {
                    warn!(file = %name, reason = %reason, "File left at source");
                },
                other => info!(file = %other.name(), outcome = other.label(), "File processed"),
            }
            metrics::counter!("mirror_files_total", "outcome" => outcome.label()).increment(1);
            report.files.push(outcome);
        }

        let pruner = TargetPruner::new(self.settings.dry_run);
        for (spec, endpoint) in &targets {
            let outcome = pruner.prune(endpoint, spec);
            info!(summary = %outcome.summary(), "Target pruning outcome");
            report.prunes.push(outcome);
        }

        report.duration_ms = duration_to_millis(start.elapsed());
        report
    }
}

/// Runs policies through the registered [`Mirrorer`]s.
pub struct MirrorEngine {
    mirrorers: Vec<Box<dyn Mirrorer>>,
    dry_run: bool,
}

impl MirrorEngine {
    /// Creates an engine with the age-based mirrorer registered.
    #[must_use]
    pub fn new(connector: Arc<dyn ShareConnector>, settings: EngineSettings) -> Self {
        Self {
            mirrorers: vec![Box::new(ActualizeMirrorer::new(connector, settings))],
            dry_run: settings.dry_run,
        }
    }

    /// Registers a mirrorer, replacing any existing one for the same method.
    #[must_use]
    pub fn with_mirrorer(mut self, mirrorer: Box<dyn Mirrorer>) -> Self {
        self.mirrorers.retain(|m| m.method() != mirrorer.method());
        self.mirrorers.push(mirrorer);
        self
    }

    /// Runs `policies` in order against the local wall clock.
    #[must_use]
    pub fn run(&self, policies: &[MirrorPolicy]) -> RunReport {
        self.run_at(policies, &Local::now().fixed_offset())
    }

    /// Runs `policies` in order as of `now`.
    #[must_use]
    pub fn run_at(&self, policies: &[MirrorPolicy], now: &DateTime<FixedOffset>) -> RunReport {
        let start = Instant::now();
        info!(policies = policies.len(), dry_run = self.dry_run, "Mirror run started");

        let mut run = RunReport {
            policies: Vec::with_capacity(policies.len()),
            dry_run: self.dry_run,
            duration_ms: 0,
        };

        for policy in policies {
            let span = info_span!(
                "mirrorkeep.policy",
                policy = %policy.name(),
                method = %policy.method()
            );
            let _entered = span.enter();
            info!("Policy started");

            let report = match self.mirrorers.iter().find(|m| m.method() == policy.method()) {
                Some(mirrorer) => mirrorer.mirror(policy, now),
                None => {
                    warn!("No mirrorer for archive method, policy skipped");
                    PolicyReport::unsupported(policy)
                },
            };

            metrics::counter!("mirror_policies_total", "status" => report.status.as_str()).increment(1);
            if report.status == PolicyStatus::Completed {
                info!(summary = %report.summary(), "Policy completed");
            }
            run.policies.push(report);
        }

        run.duration_ms = duration_to_millis(start.elapsed());
        metrics::histogram!("mirror_run_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
        info!(
            policies = run.policies.len(),
            failed = run.policies.iter().filter(|p| p.has_failures()).count(),
            elapsed_ms = run.duration_ms,
            "Mirror run completed"
        );

        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::PruneStatus;
    use crate::models::{RemoteDirectory, RetentionRule};
    use crate::remote::InMemoryShareConnector;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    const SRC: &str = "10.0.0.1";
    const DST_A: &str = "10.0.0.2";
    const DST_B: &str = "10.0.0.3";

    fn now() -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .single()
            .expect("valid date")
            .fixed_offset()
    }

    fn host(address: &str) -> RemoteHost {
        RemoteHost::new(address, "srv", "user", "pw", "local")
    }

    fn policy(rule: RetentionRule, targets: &[&str]) -> MirrorPolicy {
        let targets = targets
            .iter()
            .map(|address| TargetSpec::new(host(address), RemoteDirectory::new("arch", "/keep/")))
            .collect();
        MirrorPolicy::new(
            "nightly",
            host(SRC),
            RemoteDirectory::new("data", "/out/"),
            rule,
            targets,
        )
        .expect("valid policy")
    }

    fn aged(connector: &InMemoryShareConnector, name: &str, days: i64) {
        let modified = now().with_timezone(&Utc) - ChronoDuration::days(days);
        connector.put_file(SRC, "data", &format!("/out/{name}"), name.as_bytes(), modified);
    }

    fn engine(connector: &Arc<InMemoryShareConnector>, settings: EngineSettings) -> MirrorEngine {
        MirrorEngine::new(Arc::clone(connector) as Arc<dyn ShareConnector>, settings)
    }

    #[test]
    fn test_archives_old_files_and_skips_fresh_ones() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);
        aged(&connector, "new.zip", 2);

        let run = engine(&connector, EngineSettings::default())
            .run_at(&[policy(RetentionRule::new(30, true), &[DST_A])], &now());

        let report = run.policy("nightly").expect("report");
        assert_eq!(report.status, PolicyStatus::Completed);
        assert_eq!(report.count("archived"), 1);
        assert_eq!(report.count("skipped"), 1);
        assert_eq!(connector.file_names(SRC, "data", "/out/"), vec!["new.zip"]);
        assert_eq!(connector.file_names(DST_A, "arch", "/keep/"), vec!["old.zip"]);
        assert!(run.is_success());
    }

    #[test]
    fn test_partial_target_failure_keeps_source() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);
        connector.set_fail_writes(DST_B, true);

        let run = engine(&connector, EngineSettings::default())
            .run_at(&[policy(RetentionRule::new(30, true), &[DST_A, DST_B])], &now());

        let report = &run.policies[0];
        assert!(matches!(report.files[0], FileOutcome::Failed { .. }));
        assert_eq!(connector.file_names(SRC, "data", "/out/"), vec!["old.zip"]);
        assert_eq!(connector.file_names(DST_A, "arch", "/keep/"), vec!["old.zip"]);
        assert!(!run.is_success());
    }

    #[test]
    fn test_interrupted_write_keeps_source_across_reruns() {
        let connector = Arc::new(InMemoryShareConnector::new());
        let modified = now().with_timezone(&Utc) - ChronoDuration::days(40);
        connector.put_file(SRC, "data", "/out/old.zip", b"0123456789abcdef", modified);
        connector.set_interrupt_writes(DST_A, true);

        let engine = engine(&connector, EngineSettings::default());
        let archive = [policy(RetentionRule::new(30, true), &[DST_A])];

        let first = engine.run_at(&archive, &now());
        assert!(matches!(first.policies[0].files[0], FileOutcome::Failed { .. }));
        assert!(connector.file_names(DST_A, "arch", "/keep/").is_empty());

        let second = engine.run_at(&archive, &now());
        assert!(matches!(second.policies[0].files[0], FileOutcome::Failed { .. }));
        assert_eq!(connector.file_names(SRC, "data", "/out/"), vec!["old.zip"]);

        connector.set_interrupt_writes(DST_A, false);
        let third = engine.run_at(&archive, &now());
        assert_eq!(third.policies[0].count("archived"), 1);
        assert!(connector.file_names(SRC, "data", "/out/").is_empty());
        assert_eq!(
            connector.read_file(DST_A, "arch", "/keep/old.zip").as_deref(),
            Some(&b"0123456789abcdef"[..])
        );
    }

    #[test]
    fn test_unreachable_target_does_not_block_pruning_of_siblings() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "fresh.zip", 1);
        for (name, days) in [("a.zip", 9), ("b.zip", 8), ("c.zip", 7)] {
            let modified = now().with_timezone(&Utc) - ChronoDuration::days(days);
            connector.put_file(DST_A, "arch", &format!("/keep/{name}"), b"x", modified);
        }
        connector.set_unreachable(DST_B, true);

        let targets = [DST_A, DST_B]
            .iter()
            .map(|address| {
                TargetSpec::new(host(address), RemoteDirectory::new("arch", "/keep/"))
                    .with_max_retained(1)
            })
            .collect();
        let limited = MirrorPolicy::new(
            "nightly",
            host(SRC),
            RemoteDirectory::new("data", "/out/"),
            RetentionRule::new(30, true),
            targets,
        )
        .expect("valid policy");

        let run = engine(&connector, EngineSettings::default()).run_at(&[limited], &now());

        let prunes = &run.policies[0].prunes;
        assert_eq!(prunes.len(), 2);
        assert_eq!(prunes[0].status, PruneStatus::Pruned);
        assert_eq!(prunes[0].deleted, vec!["a.zip", "b.zip"]);
        assert!(matches!(prunes[1].status, PruneStatus::ListingFailed(_)));
        assert_eq!(connector.file_names(DST_A, "arch", "/keep/"), vec!["c.zip"]);
    }

    #[test]
    fn test_copy_only_rule_keeps_source() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);

        let run = engine(&connector, EngineSettings::default())
            .run_at(&[policy(RetentionRule::new(30, false), &[DST_A])], &now());

        assert_eq!(run.policies[0].count("copied"), 1);
        assert_eq!(connector.file_names(SRC, "data", "/out/"), vec!["old.zip"]);
    }

    #[test]
    fn test_empty_source_aborts_policy() {
        let connector = Arc::new(InMemoryShareConnector::new());
        connector.create_dir(SRC, "data", "/out/");
        connector.put_file(DST_A, "arch", "/keep/a.zip", b"a", Utc::now());

        let pruning = MirrorPolicy::new(
            "nightly",
            host(SRC),
            RemoteDirectory::new("data", "/out/"),
            RetentionRule::new(30, true),
            vec![TargetSpec::new(host(DST_A), RemoteDirectory::new("arch", "/keep/")).with_max_retained(0)],
        )
        .expect("valid policy");

        let run = engine(&connector, EngineSettings::default()).run_at(&[pruning], &now());

        assert!(matches!(run.policies[0].status, PolicyStatus::Aborted { .. }));
        assert!(run.policies[0].prunes.is_empty());
        assert_eq!(connector.file_names(DST_A, "arch", "/keep/"), vec!["a.zip"]);
    }

    #[test]
    fn test_unreachable_source_does_not_stop_later_policies() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);
        connector.put_file("10.9.9.9", "data", "/out/x.zip", b"x", Utc::now());
        connector.set_unreachable("10.9.9.9", true);

        let broken = MirrorPolicy::new(
            "broken",
            host("10.9.9.9"),
            RemoteDirectory::new("data", "/out/"),
            RetentionRule::new(-1, true),
            vec![TargetSpec::new(host(DST_A), RemoteDirectory::new("arch", "/keep/"))],
        )
        .expect("valid policy");

        let run = engine(&connector, EngineSettings::default())
            .run_at(&[broken, policy(RetentionRule::new(30, true), &[DST_A])], &now());

        assert!(matches!(run.policies[0].status, PolicyStatus::Aborted { .. }));
        assert_eq!(run.policies[1].count("archived"), 1);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);

        let run = engine(&connector, EngineSettings::default().with_dry_run(true))
            .run_at(&[policy(RetentionRule::new(30, true), &[DST_A])], &now());

        assert!(run.dry_run);
        assert_eq!(run.policies[0].count("planned"), 1);
        assert_eq!(connector.write_count(), 0);
        assert_eq!(connector.file_names(SRC, "data", "/out/"), vec!["old.zip"]);
    }

    #[test]
    fn test_overwrite_method_is_unsupported() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);
        let overwrite = policy(RetentionRule::new(30, true), &[DST_A]).with_method(ArchiveMethod::Overwrite);

        let run = engine(&connector, EngineSettings::default()).run_at(&[overwrite], &now());

        assert_eq!(run.policies[0].status, PolicyStatus::Unsupported);
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn test_parallel_targets_match_sequential_outcomes() {
        let connector = Arc::new(InMemoryShareConnector::new());
        aged(&connector, "old.zip", 40);
        aged(&connector, "older.zip", 50);
        let settings = EngineSettings::default().with_max_parallel_targets(3);

        let run = engine(&connector, settings)
            .run_at(&[policy(RetentionRule::new(30, true), &[DST_A, DST_B, "10.0.0.4"])], &now());

        assert_eq!(run.policies[0].count("archived"), 2);
        for target in [DST_A, DST_B, "10.0.0.4"] {
            assert_eq!(
                connector.file_names(target, "arch", "/keep/"),
                vec!["old.zip", "older.zip"]
            );
        }
        assert_eq!(connector.open_connections(), 0);
    }

    struct Recording;

    impl Mirrorer for Recording {
        fn method(&self) -> ArchiveMethod {
            ArchiveMethod::Overwrite
        }

        fn mirror(&self, policy: &MirrorPolicy, _now: &DateTime<FixedOffset>) -> PolicyReport {
            PolicyReport::new(policy)
        }
    }

    #[test]
    fn test_registered_mirrorer_handles_its_method() {
        let connector = Arc::new(InMemoryShareConnector::new());
        let overwrite = policy(RetentionRule::new(30, true), &[DST_A]).with_method(ArchiveMethod::Overwrite);

        let run = engine(&connector, EngineSettings::default())
            .with_mirrorer(Box::new(Recording))
            .run_at(&[overwrite], &now());

        assert_eq!(run.policies[0].status, PolicyStatus::Completed);
    }
}
