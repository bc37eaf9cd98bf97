//! Configuration loading and validation.
//!
//! This module provides:
//! - Performance presets bounding storage and upload resources
//! - Per-feature overrides
//! - SDK-level configuration loadable from TOML or JSON

pub mod preset;

pub use preset::{
    BatchProcessingLevel, BatchSize, PerformancePreset, PerformancePresetOverride,
    UploadFrequency,
};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LogLevel};

/// Logging section of the SDK configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub format: Option<LogFormat>,
}

/// Complete configuration of the persistence and upload pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Root under which every feature gets its own storage directories.
    pub storage_root: PathBuf,

    #[serde(default)]
    pub batch_size: BatchSize,

    #[serde(default)]
    pub upload_frequency: UploadFrequency,

    #[serde(default)]
    pub batch_processing_level: BatchProcessingLevel,

    /// Per-feature overrides keyed by feature name.
    #[serde(default)]
    pub overrides: HashMap<String, PerformancePresetOverride>,

    #[serde(default)]
    pub log: LogSection,
}

impl SdkConfig {
    /// Configuration with defaults rooted at `storage_root`.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        SdkConfig {
            storage_root: storage_root.into(),
            batch_size: BatchSize::default(),
            upload_frequency: UploadFrequency::default(),
            batch_processing_level: BatchProcessingLevel::default(),
            overrides: HashMap::new(),
            log: LogSection::default(),
        }
    }

    /// Parse from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: SdkConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: SdkConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension (`.json`, otherwise TOML).
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Base preset shared by every feature.
    pub fn base_preset(&self) -> PerformancePreset {
        PerformancePreset::new(
            self.batch_size,
            self.upload_frequency,
            self.batch_processing_level,
        )
    }

    /// Effective preset for a feature (base + override if any).
    pub fn preset_for(&self, feature: &str) -> PerformancePreset {
        let base = self.base_preset();
        match self.overrides.get(feature) {
            Some(o) => base.updated_with(o),
            None => base,
        }
    }

    /// Validate configuration semantically.
    pub fn validate(&self) -> Result<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(Error::Config("storage_root must not be empty".into()));
        }
        self.base_preset().validate()?;
        for (feature, o) in &self.overrides {
            if feature.is_empty() || feature.contains(['/', '\\']) {
                return Err(Error::Config(format!(
                    "invalid feature name in overrides: {:?}",
                    feature
                )));
            }
            self.base_preset()
                .updated_with(o)
                .validate()
                .map_err(|e| Error::Config(format!("override for '{}': {}", feature, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_toml_minimal() {
        let config = SdkConfig::from_toml_str(r#"storage_root = "/tmp/tb""#).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/tmp/tb"));
        assert_eq!(config.batch_size, BatchSize::Medium);
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn test_from_toml_with_overrides() {
        let input = r#"
storage_root = "/var/cache/app"
batch_size = "small"
upload_frequency = "frequent"
batch_processing_level = "high"

[log]
level = "debug"
format = "jsonl"

[overrides.session-replay]
max_object_size = 10485760
max_file_age_for_write = 1000
min_file_age_for_read = 1200
"#;
        let config = SdkConfig::from_toml_str(input).unwrap();
        assert_eq!(config.batch_size, BatchSize::Small);
        assert_eq!(config.log.level, Some(LogLevel::Debug));
        assert_eq!(config.log.format, Some(LogFormat::Jsonl));

        let replay = config.preset_for("session-replay");
        assert_eq!(replay.max_object_size, 10 * 1024 * 1024);
        assert_eq!(replay.max_file_age_for_write, Duration::from_secs(1));
        assert_eq!(replay.max_batches_per_upload, 100);

        let logs = config.preset_for("logs");
        assert_eq!(logs, config.base_preset());
    }

    #[test]
    fn test_from_json() {
        let config =
            SdkConfig::from_json_str(r#"{"storage_root": "/data", "batch_size": "large"}"#)
                .unwrap();
        assert_eq!(config.batch_size, BatchSize::Large);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let input = r#"
storage_root = "/tmp/tb"

[overrides.rum]
min_file_age_for_read = 10
"#;
        let err = SdkConfig::from_toml_str(input).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("rum"));
    }

    #[test]
    fn test_empty_root_rejected() {
        let err = SdkConfig::from_json_str(r#"{"storage_root": ""}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("sdk.json");
        fs::write(&json_path, r#"{"storage_root": "/a"}"#).unwrap();
        assert_eq!(
            SdkConfig::load(&json_path).unwrap().storage_root,
            PathBuf::from("/a")
        );

        let toml_path = dir.path().join("sdk.toml");
        fs::write(&toml_path, "storage_root = \"/b\"\n").unwrap();
        assert_eq!(
            SdkConfig::load(&toml_path).unwrap().storage_root,
            PathBuf::from("/b")
        );
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let err = SdkConfig::from_toml_str("storage_root = ").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
