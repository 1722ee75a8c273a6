//! YAML policy files.
//!
//! A policy file is a list of entries shaped like:
//!
//! ```yaml
//! - name: accounting_actualize
//!   method: 1
//!   filesmap:
//!     source_host: { host: 192.168.0.1, pcname: server, username: admin, pwd: secret, namelocalpc: pm11 }
//!     source_dir: { drive: i, dir: /Accounting/Archives/ }
//!     rule: { source_storage_days: 31, source_delete: true }
//!     target:
//!       - target_host: { host: 192.168.0.1, pcname: server, username: admin, pwd: secret, namelocalpc: pm11 }
//!         target_dir: { drive: h, dir: /Archive/2024/ }
//!         target_limit_count: 6
//! ```

use crate::models::{
    ArchiveMethod, MirrorPolicy, RemoteDirectory, RemoteHost, RetentionRule, TargetSpec,
};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct PolicyEntry {
    name: String,
    method: u8,
    filesmap: FilesMap,
}

#[derive(Debug, Deserialize)]
struct FilesMap {
    source_host: HostEntry,
    source_dir: DirEntry,
    rule: RuleEntry,
    target: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
struct HostEntry {
    host: String,
    pcname: String,
    username: String,
    pwd: String,
    namelocalpc: String,
}

impl From<HostEntry> for RemoteHost {
    fn from(entry: HostEntry) -> Self {
        Self::new(
            entry.host,
            entry.pcname,
            entry.username,
            entry.pwd,
            entry.namelocalpc,
        )
    }
}

#[derive(Debug, Deserialize)]
struct DirEntry {
    drive: String,
    dir: String,
}

impl From<DirEntry> for RemoteDirectory {
    fn from(entry: DirEntry) -> Self {
        Self::new(entry.drive, entry.dir)
    }
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    source_storage_days: i64,
    #[serde(default)]
    source_delete: bool,
}

#[derive(Debug, Deserialize)]
struct TargetEntry {
    target_host: HostEntry,
    target_dir: DirEntry,
    #[serde(default)]
    target_limit_count: Option<i64>,
}

impl PolicyEntry {
    fn into_policy(self) -> Result<MirrorPolicy> {
        let method = ArchiveMethod::from_code(self.method)
            .map_err(|e| Error::InvalidInput(format!("policy '{}': {e}", self.name)))?;

        if self.filesmap.source_dir.drive.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "policy '{}': source share cannot be empty",
                self.name
            )));
        }

        let targets = self
            .filesmap
            .target
            .into_iter()
            .map(|entry| target_spec(&self.name, entry))
            .collect::<Result<Vec<_>>>()?;

        let rule = RetentionRule::new(
            self.filesmap.rule.source_storage_days,
            self.filesmap.rule.source_delete,
        );

        MirrorPolicy::new(
            self.name,
            self.filesmap.source_host.into(),
            self.filesmap.source_dir.into(),
            rule,
            targets,
        )
        .map(|policy| policy.with_method(method))
    }
}

fn target_spec(policy: &str, entry: TargetEntry) -> Result<TargetSpec> {
    if entry.target_dir.drive.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "policy '{policy}': target share cannot be empty"
        )));
    }

    let target = TargetSpec::new(entry.target_host.into(), entry.target_dir.into());
    match entry.target_limit_count {
        None => Ok(target),
        Some(count) => usize::try_from(count)
            .map(|count| target.with_max_retained(count))
            .map_err(|_| {
                Error::InvalidInput(format!(
                    "policy '{policy}': target_limit_count must not be negative (got {count})"
                ))
            }),
    }
}

/// Parses and validates policies from YAML text.
///
/// Policy names must be unique. The returned order is the file order.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for malformed YAML, unknown methods,
/// policies without targets or negative target limits.
///
/// Names need not be unique: several policies may share one name to drive
/// one source into different targets under different rules. They all run,
/// in file order.
pub fn parse_policies(contents: &str) -> Result<Vec<MirrorPolicy>> {
    let entries: Option<Vec<PolicyEntry>> = serde_yaml_ng::from_str(contents)
        .map_err(|e| Error::InvalidInput(format!("malformed policy file: {e}")))?;

    let policies = entries
        .unwrap_or_default()
        .into_iter()
        .map(PolicyEntry::into_policy)
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    for policy in &policies {
        if !seen.insert(policy.name()) {
            warn!(policy = policy.name(), "Policy name used more than once");
        }
    }

    Ok(policies)
}

/// Loads policies from a YAML file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file cannot be read, or any
/// error of [`parse_policies`].
#[instrument(name = "mirrorkeep.config.load_policies", skip(path), fields(path = %path.display()))]
pub fn load_policies(path: &Path) -> Result<Vec<MirrorPolicy>> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_policy_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    let policies = parse_policies(&contents)?;
    debug!(count = policies.len(), "Loaded policies");
    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
- name: accounting_actualize
  method: 1
  filesmap:
    source_host:
      host: 192.168.0.1
      pcname: server
      username: admin
      pwd: '1111'
      namelocalpc: pm11
    source_dir:
      drive: i
      dir: /Accounting/Archives/Current/
    rule:
      source_storage_days: 31
      source_delete: true
    target:
      - target_host:
          host: 192.168.0.1
          pcname: server
          username: admin
          pwd: '1111'
          namelocalpc: pm11
        target_dir:
          drive: h
          dir: /Archive/Accounting/2022/
        target_limit_count: 6
      - target_host:
          host: 192.168.0.5
          pcname: nas
          username: backup
          pwd: pw
          namelocalpc: pm11
        target_dir:
          drive: f
          dir: \data_base\archives
        target_limit_count: null
";

    #[test]
    fn test_parse_sample() {
        let policies = parse_policies(SAMPLE).expect("valid policies");
        assert_eq!(policies.len(), 1);

        let policy = &policies[0];
        assert_eq!(policy.name(), "accounting_actualize");
        assert_eq!(policy.method(), ArchiveMethod::Actualize);
        assert_eq!(policy.rule(), RetentionRule::new(31, true));
        assert_eq!(policy.source_host().password(), "1111");
        assert_eq!(policy.source_directory().share(), "i");

        let targets = policy.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].max_retained_count, Some(6));
        assert_eq!(targets[1].max_retained_count, None);
        assert_eq!(targets[1].directory.path(), "/data_base/archives/");
        assert_eq!(targets[1].host.address(), "192.168.0.5");
    }

    #[test]
    fn test_empty_file_has_no_policies() {
        assert!(parse_policies("").expect("empty").is_empty());
    }

    #[test]
    fn test_rejects_unknown_method() {
        let yaml = SAMPLE.replace("method: 1", "method: 9");
        assert!(matches!(parse_policies(&yaml), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_overwrite_method_is_accepted() {
        let yaml = SAMPLE.replace("method: 1", "method: 2");
        let policies = parse_policies(&yaml).expect("valid");
        assert_eq!(policies[0].method(), ArchiveMethod::Overwrite);
    }

    #[test]
    fn test_rejects_negative_limit() {
        let yaml = SAMPLE.replace("target_limit_count: 6", "target_limit_count: -2");
        assert!(parse_policies(&yaml).is_err());
    }

    #[test]
    fn test_rejects_missing_targets() {
        let yaml = r"
- name: lonely
  method: 1
  filesmap:
    source_host: { host: h, pcname: p, username: u, pwd: x, namelocalpc: l }
    source_dir: { drive: i, dir: /src/ }
    rule: { source_storage_days: 3 }
    target: []
";
        assert!(matches!(parse_policies(yaml), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_shared_names_are_kept_in_file_order() {
        let copy_only = SAMPLE
            .replace("source_storage_days: 31", "source_storage_days: -1")
            .replace("source_delete: true", "source_delete: false");
        let yaml = format!("{copy_only}{SAMPLE}");

        let policies = parse_policies(&yaml).expect("shared names are allowed");
        assert_eq!(policies.len(), 2);
        assert!(policies.iter().all(|p| p.name() == "accounting_actualize"));
        assert_eq!(policies[0].rule(), RetentionRule::new(-1, false));
        assert_eq!(policies[1].rule(), RetentionRule::new(31, true));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(parse_policies("- name: [unclosed").is_err());
        assert!(parse_policies("- name: missing_fields\n  method: 1\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_policies(Path::new("/nonexistent/policies.yaml"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
