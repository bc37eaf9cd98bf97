//! Storage and upload performance presets.
//!
//! A preset bounds every resource the pipeline may use: file sizes, directory
//! budget, how long a file stays writable, when it becomes readable and when
//! it is considered obsolete.
//!
//! ```text
//!   created          max_file_age_for_write   min_file_age_for_read        max_file_age_for_read
//!      |---- writable ----------|---- neither ----|---- readable ... -----------|---- evicted
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Serialize `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }

    /// Same encoding for optional durations.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => {
                    serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

/// Target file age: how much data accumulates in one batch before it is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl BatchSize {
    fn mean_file_age(&self) -> Duration {
        match self {
            BatchSize::Small => Duration::from_secs(3),
            BatchSize::Medium => Duration::from_secs(10),
            BatchSize::Large => Duration::from_secs(35),
        }
    }
}

/// Base pace of upload cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFrequency {
    Frequent,
    #[default]
    Average,
    Rare,
}

impl UploadFrequency {
    fn min_upload_delay(&self) -> Duration {
        match self {
            UploadFrequency::Frequent => Duration::from_millis(500),
            UploadFrequency::Average => Duration::from_secs(2),
            UploadFrequency::Rare => Duration::from_secs(5),
        }
    }
}

/// How many batches a single upload cycle may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchProcessingLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl BatchProcessingLevel {
    pub fn max_batches_per_upload(&self) -> usize {
        match self {
            BatchProcessingLevel::Low => 1,
            BatchProcessingLevel::Medium => 10,
            BatchProcessingLevel::High => 100,
        }
    }
}

/// Resource limits for one feature's storage and upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePreset {
    /// Maximum size of a single batch file in bytes.
    pub max_file_size: u64,
    /// Maximum size of one storage directory in bytes; oldest files are purged past it.
    pub max_directory_size: u64,
    /// A file younger than this may receive more writes.
    #[serde(with = "duration_ms")]
    pub max_file_age_for_write: Duration,
    /// A file must be at least this old before it is read.
    #[serde(with = "duration_ms")]
    pub min_file_age_for_read: Duration,
    /// Files older than this are deleted without upload.
    #[serde(with = "duration_ms")]
    pub max_file_age_for_read: Duration,
    /// Maximum number of records written to one file.
    pub max_objects_in_file: u64,
    /// Records larger than this are dropped before reaching disk.
    pub max_object_size: u64,

    #[serde(with = "duration_ms")]
    pub initial_upload_delay: Duration,
    #[serde(with = "duration_ms")]
    pub min_upload_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_upload_delay: Duration,
    /// Relative step applied to the upload delay after each cycle.
    pub upload_delay_change_rate: f64,
    /// Maximum batches sent in one upload cycle.
    pub max_batches_per_upload: usize,
}

impl Default for PerformancePreset {
    fn default() -> Self {
        PerformancePreset::new(
            BatchSize::default(),
            UploadFrequency::default(),
            BatchProcessingLevel::default(),
        )
    }
}

impl PerformancePreset {
    /// Derive a preset from the coarse knobs exposed to applications.
    pub fn new(
        batch_size: BatchSize,
        upload_frequency: UploadFrequency,
        processing_level: BatchProcessingLevel,
    ) -> Self {
        let mean_file_age_ms = u64::try_from(batch_size.mean_file_age().as_millis()).unwrap_or(0);
        let min_upload_delay = upload_frequency.min_upload_delay();

        PerformancePreset {
            max_file_size: 4 * MIB,
            max_directory_size: 512 * MIB,
            // 5% below/above the mean age leaves a window where a file is
            // neither writable nor readable
            max_file_age_for_write: Duration::from_millis(mean_file_age_ms * 95 / 100),
            min_file_age_for_read: Duration::from_millis(mean_file_age_ms * 105 / 100),
            max_file_age_for_read: Duration::from_secs(18 * 3600),
            max_objects_in_file: 500,
            max_object_size: 512 * KIB,
            initial_upload_delay: min_upload_delay * 5,
            min_upload_delay,
            max_upload_delay: min_upload_delay * 10,
            upload_delay_change_rate: 0.1,
            max_batches_per_upload: processing_level.max_batches_per_upload(),
        }
    }

    /// Apply a per-feature override.
    pub fn updated_with(&self, o: &PerformancePresetOverride) -> Self {
        PerformancePreset {
            max_file_size: o.max_file_size.unwrap_or(self.max_file_size),
            max_directory_size: o.max_directory_size.unwrap_or(self.max_directory_size),
            max_file_age_for_write: o
                .max_file_age_for_write
                .unwrap_or(self.max_file_age_for_write),
            min_file_age_for_read: o.min_file_age_for_read.unwrap_or(self.min_file_age_for_read),
            max_file_age_for_read: o.max_file_age_for_read.unwrap_or(self.max_file_age_for_read),
            max_objects_in_file: o.max_objects_in_file.unwrap_or(self.max_objects_in_file),
            max_object_size: o.max_object_size.unwrap_or(self.max_object_size),
            initial_upload_delay: o.initial_upload_delay.unwrap_or(self.initial_upload_delay),
            min_upload_delay: o.min_upload_delay.unwrap_or(self.min_upload_delay),
            max_upload_delay: o.max_upload_delay.unwrap_or(self.max_upload_delay),
            upload_delay_change_rate: o
                .upload_delay_change_rate
                .unwrap_or(self.upload_delay_change_rate),
            max_batches_per_upload: o
                .max_batches_per_upload
                .unwrap_or(self.max_batches_per_upload),
        }
    }

    /// How long a sealed file must sit without writes before it is read.
    pub fn settle_delay(&self) -> Duration {
        self.min_file_age_for_read
            .saturating_sub(self.max_file_age_for_write)
    }

    /// Mid-point between the write and read windows.
    pub fn uploader_window(&self) -> Duration {
        (self.min_file_age_for_read + self.max_file_age_for_write) / 2
    }

    /// Validate the preset semantically.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::InvalidPreset("max_file_size must be positive".into()));
        }
        if self.max_object_size == 0 {
            return Err(Error::InvalidPreset(
                "max_object_size must be positive".into(),
            ));
        }
        if self.max_objects_in_file == 0 {
            return Err(Error::InvalidPreset(
                "max_objects_in_file must be positive".into(),
            ));
        }
        if self.max_directory_size < self.max_file_size {
            return Err(Error::InvalidPreset(format!(
                "max_directory_size ({}) is smaller than max_file_size ({})",
                self.max_directory_size, self.max_file_size
            )));
        }
        if self.min_file_age_for_read <= self.max_file_age_for_write {
            return Err(Error::InvalidPreset(format!(
                "min_file_age_for_read ({:?}) must exceed max_file_age_for_write ({:?})",
                self.min_file_age_for_read, self.max_file_age_for_write
            )));
        }
        if self.max_file_age_for_read < self.min_file_age_for_read {
            return Err(Error::InvalidPreset(
                "max_file_age_for_read is below min_file_age_for_read".into(),
            ));
        }
        if self.min_upload_delay > self.max_upload_delay {
            return Err(Error::InvalidPreset(
                "min_upload_delay exceeds max_upload_delay".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.upload_delay_change_rate) {
            return Err(Error::InvalidPreset(
                "upload_delay_change_rate must be within [0, 1]".into(),
            ));
        }
        if self.max_batches_per_upload == 0 {
            return Err(Error::InvalidPreset(
                "max_batches_per_upload must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Per-feature tuning; unset fields inherit from the base preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformancePresetOverride {
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub max_directory_size: Option<u64>,
    #[serde(default, with = "duration_ms::option")]
    pub max_file_age_for_write: Option<Duration>,
    #[serde(default, with = "duration_ms::option")]
    pub min_file_age_for_read: Option<Duration>,
    #[serde(default, with = "duration_ms::option")]
    pub max_file_age_for_read: Option<Duration>,
    #[serde(default)]
    pub max_objects_in_file: Option<u64>,
    #[serde(default)]
    pub max_object_size: Option<u64>,
    #[serde(default, with = "duration_ms::option")]
    pub initial_upload_delay: Option<Duration>,
    #[serde(default, with = "duration_ms::option")]
    pub min_upload_delay: Option<Duration>,
    #[serde(default, with = "duration_ms::option")]
    pub max_upload_delay: Option<Duration>,
    #[serde(default)]
    pub upload_delay_change_rate: Option<f64>,
    #[serde(default)]
    pub max_batches_per_upload: Option<usize>,
}
