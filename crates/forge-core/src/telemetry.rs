//! Tracing initialisation for binaries and tests embedding the pipeline

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Tracing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_directive: String,
    /// Output format
    pub format: LogFormat,
    /// Include module targets in log lines
    pub with_target: bool,
}

impl TelemetryConfig {
    /// With filter directive
    #[inline]
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// With output format
    #[inline]
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> Result<EnvFilter, PipelineError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_directive)
                .map_err(|e| PipelineError::config(format!("invalid log directive: {e}"))),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "forge_core=info,forge_memory=info,forge_artifact=info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

/// Install the global tracing subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed.
///
/// # Errors
/// `PipelineError::Config` if the filter directive does not parse.
pub fn init_tracing(config: &TelemetryConfig) -> Result<bool, PipelineError> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init(),
    };
    Ok(installed.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_is_a_config_error() {
        let config = TelemetryConfig::default().with_directive("forge_core=notalevel");
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(init_tracing(&config), Err(PipelineError::Config(_))));
        }
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        let config = TelemetryConfig::default().with_format(LogFormat::Json);
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config).unwrap());
    }

    #[test]
    fn format_parses_lowercase() {
        let config: TelemetryConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.with_target);
    }
}
