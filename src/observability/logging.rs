//! Structured logging configuration.

use super::parse_string_env;
use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Filter used when neither the settings nor the environment set one.
const DEFAULT_FILTER: &str = "info";

/// Filter used by `--verbose` when nothing else sets one.
const VERBOSE_FILTER: &str = "debug";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from settings with env overrides.
    ///
    /// Precedence: `MIRRORKEEP_LOG_*` variables, then the settings file, then
    /// the defaults (`debug` with `verbose`, `info` otherwise).
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let default_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };

        let mut config = Self {
            format: settings
                .and_then(|s| s.format.as_deref())
                .map(LogFormat::parse)
                .unwrap_or_default(),
            filter: settings
                .and_then(|s| s.filter.clone())
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| default_filter.to_string()),
            file: settings.and_then(|s| s.file.clone()),
        };

        if let Some(format) = parse_string_env("MIRRORKEEP_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Some(filter) = parse_string_env("MIRRORKEEP_LOG_FILTER") {
            config.filter = filter;
        }
        if let Some(file) = parse_string_env("MIRRORKEEP_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }

        config
    }
}
