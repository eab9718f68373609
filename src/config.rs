//! Monitor Configuration
//!
//! Construction parameters for the sample aggregator.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the windowed sample aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Number of windows reported by an aggregation
    pub num_windows: usize,

    /// Width of a single time window in milliseconds
    pub window_ms: i64,

    /// Minimum samples required for a window to count as fully observed
    pub min_samples_per_window: u64,

    /// Extra settled windows retained beyond the reportable range, available
    /// to adjacent-window extrapolation
    pub max_extra_windows_kept: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            num_windows: 20,
            window_ms: 300_000,
            min_samples_per_window: 3,
            max_extra_windows_kept: 8,
        }
    }
}

impl MonitorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_windows == 0 {
            return Err(MonitorError::InvalidArgument(
                "num_windows must be positive".to_string(),
            ));
        }
        if self.window_ms <= 0 {
            return Err(MonitorError::InvalidArgument(
                "window_ms must be positive".to_string(),
            ));
        }
        if self.min_samples_per_window == 0 {
            return Err(MonitorError::InvalidArgument(
                "min_samples_per_window must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum samples for a window to qualify as a partial observation.
    pub fn min_samples_for_extrapolation(&self) -> u64 {
        self.min_samples_per_window / 2
    }

    /// Upper bound on retained windows: the reportable range, the spare
    /// windows kept for extrapolation, and the active window.
    pub fn max_windows_retained(&self) -> usize {
        self.num_windows + self.max_extra_windows_kept + 1
    }
}
