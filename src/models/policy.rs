//! Mirror policies and retention rules.

use super::{RemoteDirectory, RemoteHost};
use crate::{Error, Result};
use std::fmt;

/// Archival strategy requested by a policy.
///
/// Policy files identify the method by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMethod {
    /// Age-based archival: copy files older than the rule allows.
    #[default]
    Actualize,
    /// Replace existing archive copies with current ones (reserved).
    Overwrite,
}

impl ArchiveMethod {
    /// Resolves a numeric method code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown codes.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Actualize),
            2 => Ok(Self::Overwrite),
            other => Err(Error::InvalidInput(format!(
                "unknown archive method {other} (expected 1 or 2)"
            ))),
        }
    }

    /// Numeric code used in policy files.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Actualize => 1,
            Self::Overwrite => 2,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Actualize => "actualize",
            Self::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for ArchiveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age-based admission rule for source files.
///
/// `max_age_days` semantics:
/// - positive: files at least that many days old are admitted
/// - negative: every existing file is admitted
/// - zero: files modified in the current calendar month are admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionRule {
    /// Age threshold in days.
    pub max_age_days: i64,
    /// Whether the source copy is removed once every target has the file.
    pub delete_source: bool,
}

impl RetentionRule {
    /// Creates a rule.
    #[must_use]
    pub const fn new(max_age_days: i64, delete_source: bool) -> Self {
        Self {
            max_age_days,
            delete_source,
        }
    }
}

/// One backup destination of a policy.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// Host holding the target directory.
    pub host: RemoteHost,
    /// Target directory.
    pub directory: RemoteDirectory,
    /// Maximum number of files kept in the directory; `None` disables pruning.
    pub max_retained_count: Option<usize>,
}

impl TargetSpec {
    /// Creates a target without pruning.
    #[must_use]
    pub const fn new(host: RemoteHost, directory: RemoteDirectory) -> Self {
        Self {
            host,
            directory,
            max_retained_count: None,
        }
    }

    /// Sets the retained file count.
    #[must_use]
    pub const fn with_max_retained(mut self, count: usize) -> Self {
        self.max_retained_count = Some(count);
        self
    }
}

/// A named unit of work: one source directory mirrored to one or more targets.
#[derive(Debug, Clone)]
pub struct MirrorPolicy {
    name: String,
    method: ArchiveMethod,
    source_host: RemoteHost,
    source_directory: RemoteDirectory,
    rule: RetentionRule,
    targets: Vec<TargetSpec>,
}

impl MirrorPolicy {
    /// Creates an age-based policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the name is blank or `targets` is
    /// empty.
    pub fn new(
        name: impl Into<String>,
        source_host: RemoteHost,
        source_directory: RemoteDirectory,
        rule: RetentionRule,
        targets: Vec<TargetSpec>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("policy name cannot be empty".to_string()));
        }
        if targets.is_empty() {
            return Err(Error::InvalidInput(format!(
                "policy '{name}' must have at least one target"
            )));
        }

        Ok(Self {
            name,
            method: ArchiveMethod::Actualize,
            source_host,
            source_directory,
            rule,
            targets,
        })
    }

    /// Sets the archival method.
    #[must_use]
    pub const fn with_method(mut self, method: ArchiveMethod) -> Self {
        self.method = method;
        self
    }

    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Archival method.
    #[must_use]
    pub const fn method(&self) -> ArchiveMethod {
        self.method
    }

    /// Host of the source directory.
    #[must_use]
    pub const fn source_host(&self) -> &RemoteHost {
        &self.source_host
    }

    /// Source directory.
    #[must_use]
    pub const fn source_directory(&self) -> &RemoteDirectory {
        &self.source_directory
    }

    /// Retention rule applied to source files.
    #[must_use]
    pub const fn rule(&self) -> RetentionRule {
        self.rule
    }

    /// Backup targets, in configured order. Never empty.
    #[must_use]
    pub fn targets(&self) -> &[TargetSpec] {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> RemoteHost {
        RemoteHost::new("10.0.0.1", "server", "admin", "secret", "local")
    }

    #[test]
    fn test_policy_requires_target() {
        let result = MirrorPolicy::new(
            "nightly",
            host(),
            RemoteDirectory::new("i", "/src/"),
            RetentionRule::new(30, true),
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_policy_requires_name() {
        let target = TargetSpec::new(host(), RemoteDirectory::new("f", "/dst/"));
        let result = MirrorPolicy::new(
            "  ",
            host(),
            RemoteDirectory::new("i", "/src/"),
            RetentionRule::default(),
            vec![target],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_defaults_to_actualize() {
        let target = TargetSpec::new(host(), RemoteDirectory::new("f", "/dst/")).with_max_retained(6);
        let policy = MirrorPolicy::new(
            "nightly",
            host(),
            RemoteDirectory::new("i", "/src/"),
            RetentionRule::new(31, true),
            vec![target],
        )
        .expect("valid policy");

        assert_eq!(policy.method(), ArchiveMethod::Actualize);
        assert_eq!(policy.targets().len(), 1);
        assert_eq!(policy.targets()[0].max_retained_count, Some(6));
        assert!(policy.rule().delete_source);
    }

    #[test]
    fn test_archive_method_codes() {
        assert_eq!(ArchiveMethod::from_code(1).ok(), Some(ArchiveMethod::Actualize));
        assert_eq!(ArchiveMethod::from_code(2).ok(), Some(ArchiveMethod::Overwrite));
        assert!(ArchiveMethod::from_code(7).is_err());
        assert_eq!(ArchiveMethod::Overwrite.code(), 2);
        assert_eq!(ArchiveMethod::Actualize.to_string(), "actualize");
    }
}
