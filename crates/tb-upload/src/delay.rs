//! Adaptive pause between upload cycles.

use std::time::Duration;

use tb_common::PerformancePreset;

/// Backs off while uploads fail or there is nothing to send, speeds up
/// while batches are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUploadDelay {
    current: Duration,
    min: Duration,
    max: Duration,
    change_rate: f64,
}

impl DataUploadDelay {
    pub fn new(preset: &PerformancePreset) -> Self {
        DataUploadDelay {
            current: preset
                .initial_upload_delay
                .max(preset.min_upload_delay)
                .min(preset.max_upload_delay),
            min: preset.min_upload_delay,
            max: preset.max_upload_delay,
            change_rate: clamp_rate(preset.upload_delay_change_rate),
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn decrease(&mut self) {
        self.current = self
            .current
            .mul_f64(1.0 - self.change_rate)
            .max(self.min);
    }

    pub fn increase(&mut self) {
        self.current = self
            .current
            .mul_f64(1.0 + self.change_rate)
            .min(self.max);
    }
}

/// `Duration::mul_f64` panics on a negative factor, so the rate stays in [0, 1].
fn clamp_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
