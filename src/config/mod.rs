//! Configuration management.
//!
//! Two files drive a run: a TOML settings file (timeouts, logging, metrics,
//! share mounts) and a YAML policy file listing what to mirror.

mod policy_file;

pub use policy_file::{load_policies, parse_policies};

use crate::remote::{EndpointSettings, MountPoint};
use crate::services::EngineSettings;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the settings file location.
pub const CONFIG_PATH_ENV: &str = "MIRRORKEEP_CONFIG_PATH";

/// Policy file name used when the settings do not name one.
const DEFAULT_POLICIES_FILE: &str = "policies.yaml";

/// Main configuration for mirrorkeep.
#[derive(Debug, Clone)]
pub struct MirrorkeepConfig {
    /// Path to the YAML policy file.
    pub policies_path: PathBuf,
    /// Remote operation timeouts.
    pub endpoint: EndpointSettings,
    /// Concurrent target copies per file.
    pub max_parallel_targets: usize,
    /// Logging settings, before environment overrides.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
    /// Local mount points of remote shares.
    pub mounts: Vec<MountPoint>,
}

/// Logging section of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, for example `mirrorkeep=debug`.
    pub filter: Option<String>,
    /// Log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// Metrics section of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus textfile written at the end of a run.
    pub textfile: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Policy file path, relative to the settings file.
    pub policies_path: Option<PathBuf>,
    /// Endpoint section.
    pub endpoint: Option<ConfigFileEndpoint>,
    /// Engine section.
    pub engine: Option<ConfigFileEngine>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
    /// Mount table.
    #[serde(default)]
    pub mounts: Vec<MountPoint>,
}

/// Endpoint section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEndpoint {
    /// Session timeout in seconds. For mounted shares this bounds the
    /// `stat` of the host's mount points.
    pub connect_timeout_secs: Option<u64>,
    /// Listing timeout in seconds. Bounds the directory read on mounted
    /// shares; reads and writes of file content are not bounded.
    pub list_timeout_secs: Option<u64>,
}

/// Engine section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEngine {
    /// Concurrent target copies per file.
    pub max_parallel_targets: Option<usize>,
}

impl Default for MirrorkeepConfig {
    fn default() -> Self {
        Self {
            policies_path: PathBuf::from(DEFAULT_POLICIES_FILE),
            endpoint: EndpointSettings::default(),
            max_parallel_targets: 1,
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
            mounts: Vec::new(),
        }
    }
}

impl MirrorkeepConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// Relative paths inside the file are resolved against its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::parse(&contents, path.parent())
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid settings TOML or fails
    /// validation.
    pub fn parse(contents: &str, base_dir: Option<&Path>) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let config = Self::from_config_file(file, base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Reads `<config dir>/mirrorkeep/config.toml` when it exists, otherwise
    /// returns defaults with the policy file expected in the same directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the default file exists but cannot be loaded.
    pub fn load_default() -> Result<Self> {
        let Some(dir) = Self::default_dir() else {
            return Ok(Self::default());
        };

        let path = dir.join("config.toml");
        if path.exists() {
            return Self::load_from_file(&path);
        }

        Ok(Self {
            policies_path: dir.join(DEFAULT_POLICIES_FILE),
            ..Self::default()
        })
    }

    /// Platform configuration directory for mirrorkeep.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("mirrorkeep"))
    }

    /// Converts a `ConfigFile` to `MirrorkeepConfig`.
    fn from_config_file(file: ConfigFile, base_dir: Option<&Path>) -> Self {
        let mut config = Self::default();
        let resolve = |path: PathBuf| match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        };

        config.policies_path = resolve(
            file.policies_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICIES_FILE)),
        );

        if let Some(endpoint) = file.endpoint {
            if let Some(secs) = endpoint.connect_timeout_secs {
                config.endpoint.connect_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = endpoint.list_timeout_secs {
                config.endpoint.list_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(count) = file.engine.and_then(|engine| engine.max_parallel_targets) {
            config.max_parallel_targets = count;
        }
        if let Some(mut logging) = file.logging {
            logging.file = logging.file.map(resolve);
            config.logging = logging;
        }
        if let Some(mut metrics) = file.metrics {
            metrics.textfile = metrics.textfile.map(resolve);
            config.metrics = metrics;
        }
        config.mounts = file
            .mounts
            .into_iter()
            .map(|mut mount| {
                mount.path = resolve(mount.path);
                mount
            })
            .collect();

        config
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for zero timeouts, a zero parallelism
    /// level or a mount listed twice.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.connect_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "endpoint.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.endpoint.list_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "endpoint.list_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_parallel_targets == 0 {
            return Err(Error::InvalidInput(
                "engine.max_parallel_targets must be at least 1".to_string(),
            ));
        }

        for (index, mount) in self.mounts.iter().enumerate() {
            let duplicate = self.mounts[..index]
                .iter()
                .any(|other| other.host == mount.host && other.share == mount.share);
            if duplicate {
                return Err(Error::InvalidInput(format!(
                    "share '{}' on host '{}' is mounted twice",
                    mount.share, mount.host
                )));
            }
        }

        Ok(())
    }

    /// Sets the policy file path.
    #[must_use]
    pub fn with_policies_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policies_path = path.into();
        self
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub const fn engine_settings(&self, dry_run: bool) -> EngineSettings {
        EngineSettings {
            endpoint: self.endpoint,
            max_parallel_targets: self.max_parallel_targets,
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = MirrorkeepConfig::default();
        assert_eq!(config.endpoint.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.endpoint.list_timeout, Duration::from_secs(10));
        assert_eq!(config.max_parallel_targets, 1);
        assert!(config.mounts.is_empty());
    }

    #[test]
    fn test_parse_full_settings() {
        let toml = r#"
            policies_path = "rules.yaml"

            [endpoint]
            connect_timeout_secs = 5
            list_timeout_secs = 3

            [engine]
            max_parallel_targets = 4

            [logging]
            format = "json"
            filter = "mirrorkeep=debug"

            [metrics]
            textfile = "/var/lib/node_exporter/mirrorkeep.prom"

            [[mounts]]
            host = "192.168.0.1"
            share = "i"
            path = "mnt/i"
        "#;

        let config = MirrorkeepConfig::parse(toml, Some(Path::new("/etc/mirrorkeep")))
            .expect("valid settings");

        assert_eq!(config.policies_path, PathBuf::from("/etc/mirrorkeep/rules.yaml"));
        assert_eq!(config.endpoint.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.endpoint.list_timeout, Duration::from_secs(3));
        assert_eq!(config.max_parallel_targets, 4);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(
            config.metrics.textfile,
            Some(PathBuf::from("/var/lib/node_exporter/mirrorkeep.prom"))
        );
        assert_eq!(config.mounts.len(), 1);
        assert_eq!(config.mounts[0].path, PathBuf::from("/etc/mirrorkeep/mnt/i"));

        let engine = config.engine_settings(true);
        assert!(engine.dry_run);
        assert_eq!(engine.max_parallel_targets, 4);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = MirrorkeepConfig::parse("[endpoint]\nconnect_timeout_secs = 0\n", None);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_duplicate_mounts() {
        let toml = r#"
            [[mounts]]
            host = "h"
            share = "s"
            path = "/a"

            [[mounts]]
            host = "h"
            share = "s"
            path = "/b"
        "#;
        assert!(MirrorkeepConfig::parse(toml, None).is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(MirrorkeepConfig::parse("polices_path = \"x\"\n", None).is_err());
    }

    #[test]
    fn test_load_from_file_resolves_relative_to_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[engine]\nmax_parallel_targets = 2").expect("write");

        let config = MirrorkeepConfig::load_from_file(file.path()).expect("load");
        let dir = file.path().parent().expect("parent");

        assert_eq!(config.policies_path, dir.join("policies.yaml"));
        assert_eq!(config.max_parallel_targets, 2);
    }

    #[test]
    fn test_missing_file_is_operation_failure() {
        let result = MirrorkeepConfig::load_from_file(Path::new("/nonexistent/mirrorkeep.toml"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
