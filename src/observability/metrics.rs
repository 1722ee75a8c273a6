//! Prometheus metrics.
//!
//! Runs are short-lived, so instead of serving an HTTP endpoint the recorder's
//! rendering is written to a file picked up by the node exporter's textfile
//! collector.

use super::parse_string_env;
use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Prometheus textfile; metrics are not recorded when unset.
    pub textfile: Option<PathBuf>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let mut config = Self {
            textfile: settings.and_then(|s| s.textfile.clone()),
        };

        if let Some(textfile) = parse_string_env("MIRRORKEEP_METRICS_TEXTFILE") {
            config.textfile = Some(PathBuf::from(textfile));
        }

        config
    }
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    textfile: PathBuf,
}

impl MetricsHandle {
    /// Writes the current rendering to the textfile.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn flush(&self) -> Result<()> {
        write_textfile(&self.prometheus, &self.textfile)
    }
}

/// Installs the Prometheus recorder when a textfile is configured.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    let Some(textfile) = &config.textfile else {
        return Ok(None);
    };

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;

    Ok(Some(MetricsHandle {
        prometheus,
        textfile: textfile.clone(),
    }))
}

/// Writes a rendering to `path`, replacing the previous file atomically so
/// the collector never reads a partial file.
pub fn write_textfile(prometheus: &PrometheusHandle, path: &Path) -> Result<()> {
    let mut payload = prometheus.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staging = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::operation("metrics_textfile_write", format!("{}: {e}", dir.display())))?;
    staging
        .write_all(payload.as_bytes())
        .map_err(|e| Error::operation("metrics_textfile_write", e))?;
    staging
        .persist(path)
        .map_err(|e| Error::operation("metrics_textfile_write", format!("{}: {e}", path.display())))?;

    tracing::debug!(bytes = payload.len(), path = %path.display(), "Wrote metrics textfile");
    Ok(())
}
