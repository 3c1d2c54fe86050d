//! Pipeline configuration
//!
//! Loadable from TOML; every field has a default so partial files work:
//!
//! ```toml
//! bucket = "product-images"
//! group_timeout_ms = 90000
//!
//! [memory]
//! ttl_days = 30
//! write_mode = "queued"
//! ```

use crate::error::PipelineError;
use forge_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Product pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Durable store bucket for raw images
    pub bucket: String,
    /// Timeout of each concurrent stage group, in milliseconds
    pub group_timeout_ms: u64,
    /// Most candidate URLs handed to the scrape stage
    pub max_scrape_urls: usize,
    /// Lifetime of fallback-cached artifacts
    pub fallback_ttl_secs: u64,
    /// Longest textual stage summary stored in the memory log
    pub summary_limit_chars: usize,
    /// Currency used when no stage supplies one
    pub default_currency: String,
    /// Language of the primary product fields
    pub default_language: String,
    /// Languages requested from content refinement
    pub target_languages: Vec<String>,
    /// Memory log settings
    pub memory: MemoryConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `PipelineError::Config` on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self =
            toml::from_str(text).map_err(|e| PipelineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `PipelineError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// With bucket
    #[inline]
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// With concurrent group timeout
    #[inline]
    #[must_use]
    pub fn with_group_timeout(mut self, timeout: Duration) -> Self {
        self.group_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With target languages
    #[inline]
    #[must_use]
    pub fn with_target_languages(mut self, languages: Vec<String>) -> Self {
        self.target_languages = languages;
        self
    }

    /// With memory settings
    #[inline]
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Concurrent group timeout
    #[inline]
    #[must_use]
    pub fn group_timeout(&self) -> Duration {
        Duration::from_millis(self.group_timeout_ms)
    }

    /// Fallback artifact lifetime
    #[inline]
    #[must_use]
    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_secs)
    }

    /// Reject values the pipeline cannot run with
    ///
    /// # Errors
    /// `PipelineError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.bucket.trim().is_empty() {
            return Err(PipelineError::config("bucket must not be empty"));
        }
        if self.group_timeout_ms == 0 {
            return Err(PipelineError::config("group_timeout_ms must be positive"));
        }
        if self.fallback_ttl_secs == 0 {
            return Err(PipelineError::config("fallback_ttl_secs must be positive"));
        }
        if self.summary_limit_chars == 0 {
            return Err(PipelineError::config("summary_limit_chars must be positive"));
        }
        if self.default_currency.trim().is_empty() {
            return Err(PipelineError::config("default_currency must not be empty"));
        }
        if self.default_language.trim().is_empty() {
            return Err(PipelineError::config("default_language must not be empty"));
        }
        if self.memory.ttl_days <= 0 {
            return Err(PipelineError::config("memory.ttl_days must be positive"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: "product-images".to_string(),
            group_timeout_ms: 90_000,
            max_scrape_urls: 5,
            fallback_ttl_secs: 30 * 60,
            summary_limit_chars: 1000,
            default_currency: "USD".to_string(),
            default_language: "en".to_string(),
            target_languages: vec!["en".to_string()],
            memory: MemoryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_memory::DurableWriteMode;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.group_timeout(), Duration::from_secs(90));
        assert_eq!(config.fallback_ttl(), Duration::from_secs(1800));
        assert_eq!(config.max_scrape_urls, 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            bucket = "catalog"
            target_languages = ["en", "de"]

            [memory]
            write_mode = "queued"
            "#,
        )
        .unwrap();

        assert_eq!(config.bucket, "catalog");
        assert_eq!(config.target_languages, vec!["en", "de"]);
        assert_eq!(config.memory.write_mode, DurableWriteMode::Queued);
        assert_eq!(config.memory.ttl_days, 30);
        assert_eq!(config.default_currency, "USD");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PipelineConfig::from_toml_str("group_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(msg) if msg.contains("group_timeout_ms")));

        let err = PipelineConfig::new().with_bucket(" ").validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        assert!(PipelineConfig::from_toml_str("bucket = [").is_err());
    }

    #[test]
    fn sub_second_group_timeout_is_kept() {
        let config = PipelineConfig::new().with_group_timeout(Duration::from_millis(500));
        config.validate().unwrap();
        assert_eq!(config.group_timeout(), Duration::from_millis(500));

        let parsed = PipelineConfig::from_toml_str("group_timeout_ms = 250").unwrap();
        assert_eq!(parsed.group_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_scrape_urls = 3").unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_scrape_urls, 3);

        let missing = PipelineConfig::from_file("/definitely/not/here.toml");
        assert!(missing.is_err());
    }
}
